//! Docker-specific error types

use thiserror::Error;

/// Errors raised while talking to the Docker daemon
#[derive(Error, Debug)]
pub enum DockerError {
    /// Failed to connect to the Docker daemon
    #[error("Docker connection failed: {0}")]
    Connection(String),

    /// Docker daemon is not running
    #[error("Docker daemon not running. Start Docker Desktop or the Docker service.")]
    NotRunning,

    /// Permission denied accessing Docker socket
    #[error(
        "Permission denied accessing Docker socket. You may need to add your user to the 'docker' group."
    )]
    PermissionDenied,

    /// Base image could not be resolved or pulled
    #[error("Docker pull failed: {0}")]
    Pull(String),

    /// Image build failed
    ///
    /// `step` is the 1-based Dockerfile instruction the daemon was running
    /// when it reported the failure, if it reported any step at all.
    #[error("Docker build failed: {message}")]
    Build {
        step: Option<usize>,
        message: String,
    },

    /// Image inspection, tagging or removal failed
    #[error("Image operation failed: {0}")]
    Image(String),

    /// Container operation failed
    #[error("Container operation failed: {0}")]
    Container(String),

    /// Operation timed out
    #[error("Docker operation timed out")]
    Timeout,
}

impl DockerError {
    /// Whether the daemon itself is unreachable or unusable
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            DockerError::Connection(_) | DockerError::NotRunning | DockerError::PermissionDenied
        )
    }
}

impl From<bollard::errors::Error> for DockerError {
    fn from(err: bollard::errors::Error) -> Self {
        let msg = err.to_string();

        if msg.contains("Cannot connect to the Docker daemon")
            || msg.contains("connection refused")
            || msg.contains("No such file or directory")
        {
            DockerError::NotRunning
        } else if msg.contains("permission denied") || msg.contains("Permission denied") {
            DockerError::PermissionDenied
        } else if matches!(err, bollard::errors::Error::RequestTimeoutError) {
            DockerError::Timeout
        } else {
            DockerError::Connection(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_error_displays_correctly() {
        let err = DockerError::NotRunning;
        assert!(err.to_string().contains("Docker daemon not running"));

        let err = DockerError::Build {
            step: Some(6),
            message: "cargo build exited with 101".to_string(),
        };
        assert!(err.to_string().contains("exited with 101"));
    }

    #[test]
    fn engine_failures_are_distinguished() {
        assert!(DockerError::NotRunning.is_engine_failure());
        assert!(DockerError::PermissionDenied.is_engine_failure());
        assert!(DockerError::Connection("reset".to_string()).is_engine_failure());
        assert!(!DockerError::Pull("manifest unknown".to_string()).is_engine_failure());
        assert!(!DockerError::Timeout.is_engine_failure());
    }

    #[test]
    fn bollard_timeout_maps_to_timeout() {
        let err = DockerError::from(bollard::errors::Error::RequestTimeoutError);
        assert!(matches!(err, DockerError::Timeout));
    }
}

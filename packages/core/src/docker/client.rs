//! Docker client wrapper with connection handling

use std::time::Duration;

use bollard::Docker;

use super::error::DockerError;

/// Request timeout used for builds, long enough for a cold release compile
pub const BUILD_REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);

/// Docker client wrapper with connection handling
#[derive(Clone)]
pub struct DockerClient {
    inner: Docker,
}

impl DockerClient {
    /// Connect to the local daemon with bollard's default timeout
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::Connection(e.to_string()))?;

        Ok(Self { inner: docker })
    }

    /// Connect with a custom request timeout
    ///
    /// Image builds stream for as long as the compile runs, so they need far
    /// more than the default 120 seconds.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::Connection(e.to_string()))?
            .with_timeout(timeout);

        Ok(Self { inner: docker })
    }

    pub async fn verify_connection(&self) -> Result<(), DockerError> {
        self.inner.ping().await.map_err(DockerError::from)?;
        Ok(())
    }

    /// Daemon version and API version, for diagnostics
    pub async fn version(&self) -> Result<String, DockerError> {
        let version = self.inner.version().await.map_err(DockerError::from)?;

        Ok(format!(
            "Docker {} (API {}, {}/{})",
            version.version.unwrap_or_else(|| "unknown".to_string()),
            version.api_version.unwrap_or_else(|| "unknown".to_string()),
            version.os.unwrap_or_else(|| "unknown".to_string()),
            version.arch.unwrap_or_else(|| "unknown".to_string()),
        ))
    }

    /// Access inner Bollard client for advanced operations
    pub fn inner(&self) -> &Docker {
        &self.inner
    }
}

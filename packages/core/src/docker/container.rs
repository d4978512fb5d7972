//! Running built images
//!
//! Containers created here never override the image's entry point or
//! command, so they show exactly what the image does when started plainly.

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, TopOptions, WaitContainerOptions,
};
use futures_util::StreamExt;
use tracing::debug;

use super::{DockerClient, DockerError};

/// Exit code reported when the run is interrupted from the terminal
pub const INTERRUPTED_EXIT_CODE: i64 = 130;

/// Which stream a chunk of container output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// What the runtime actually launched for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    /// Executable the runtime started (`Path`)
    pub path: String,
    /// Arguments passed to it (`Args`)
    pub args: Vec<String>,
    pub running: bool,
    pub exit_code: Option<i64>,
    /// Whether the process list showed the binary; `None` if the
    /// container had already stopped
    pub process_seen: Option<bool>,
}

impl LaunchReport {
    /// The binary itself is the process: no shell, no arguments
    pub fn is_direct_launch_of(&self, binary: &str) -> bool {
        self.path == binary && self.args.is_empty() && self.process_seen != Some(false)
    }
}

async fn create_plain_container(
    client: &DockerClient,
    image: &str,
    name: &str,
) -> Result<String, DockerError> {
    debug!("Creating container {} from {}", name, image);

    let config = Config {
        image: Some(image.to_string()),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };
    let options = CreateContainerOptions {
        name,
        platform: None,
    };

    let response = client
        .inner()
        .create_container(Some(options), config)
        .await
        .map_err(|e| match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => DockerError::Image(format!("Image '{image}' not found. Run 'z2p-image build' first.")),
            other => DockerError::Container(format!("Failed to create container {name}: {other}")),
        })?;

    debug!("Container created with ID: {}", response.id);
    Ok(response.id)
}

async fn start(client: &DockerClient, id: &str) -> Result<(), DockerError> {
    client
        .inner()
        .start_container(id, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| DockerError::Container(format!("Failed to start container {id}: {e}")))
}

/// Force-remove a container; a missing container is fine
pub async fn remove_container(client: &DockerClient, id: &str) -> Result<(), DockerError> {
    let options = RemoveContainerOptions {
        force: true,
        v: true,
        link: false,
    };
    match client.inner().remove_container(id, Some(options)).await {
        Ok(()) => {
            debug!("Container {} removed", id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(e) => Err(DockerError::Container(format!(
            "Failed to remove container {id}: {e}"
        ))),
    }
}

async fn stop(client: &DockerClient, id: &str) {
    if let Err(e) = client
        .inner()
        .stop_container(id, Some(StopContainerOptions { t: 10 }))
        .await
    {
        debug!("Stopping container {} failed: {}", id, e);
    }
}

async fn wait_for_exit(client: &DockerClient, id: &str) -> Result<i64, DockerError> {
    let mut stream = std::pin::pin!(
        client
            .inner()
            .wait_container(id, None::<WaitContainerOptions<String>>)
    );

    let mut exit_code = 0;
    while let Some(result) = stream.next().await {
        match result {
            Ok(response) => exit_code = response.status_code,
            // bollard reports non-zero exits as an error carrying the code
            Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                exit_code = code;
            }
            Err(e) => {
                return Err(DockerError::Container(format!(
                    "Failed waiting for container {id}: {e}"
                )));
            }
        }
    }
    Ok(exit_code)
}

/// Run an image in the foreground and return its exit code
///
/// Output is handed to `on_output` as it arrives. Ctrl-C stops the
/// container. The container is removed in every case.
pub async fn run_image(
    client: &DockerClient,
    image: &str,
    name: &str,
    on_output: &mut dyn FnMut(OutputStream, &[u8]),
) -> Result<i64, DockerError> {
    let id = create_plain_container(client, image, name).await?;
    let result = run_created(client, &id, on_output).await;
    let removed = remove_container(client, &id).await;
    let exit_code = result?;
    removed?;
    Ok(exit_code)
}

async fn run_created(
    client: &DockerClient,
    id: &str,
    on_output: &mut dyn FnMut(OutputStream, &[u8]),
) -> Result<i64, DockerError> {
    start(client, id).await?;

    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        ..Default::default()
    };
    let mut logs = std::pin::pin!(client.inner().logs(id, Some(options)));

    loop {
        tokio::select! {
            chunk = logs.next() => match chunk {
                Some(Ok(LogOutput::StdErr { message })) => on_output(OutputStream::Stderr, &message),
                Some(Ok(
                    LogOutput::StdOut { message } | LogOutput::Console { message },
                )) => on_output(OutputStream::Stdout, &message),
                Some(Ok(LogOutput::StdIn { .. })) => {}
                Some(Err(e)) => {
                    debug!("Log stream for {} ended with error: {}", id, e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping container {}", id);
                stop(client, id).await;
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        }
    }

    wait_for_exit(client, id).await
}

/// Start an image and report how the runtime launched its process
///
/// The container is stopped and removed before returning.
pub async fn inspect_launch(
    client: &DockerClient,
    image: &str,
    name: &str,
    binary: &str,
) -> Result<LaunchReport, DockerError> {
    let id = create_plain_container(client, image, name).await?;
    let result = inspect_started(client, &id, binary).await;
    stop(client, &id).await;
    let removed = remove_container(client, &id).await;
    let report = result?;
    removed?;
    Ok(report)
}

async fn inspect_started(
    client: &DockerClient,
    id: &str,
    binary: &str,
) -> Result<LaunchReport, DockerError> {
    start(client, id).await?;

    let info = client
        .inner()
        .inspect_container(id, None)
        .await
        .map_err(|e| DockerError::Container(format!("Failed to inspect container {id}: {e}")))?;

    let state = info.state.unwrap_or_default();
    let running = state.running.unwrap_or(false);

    let process_seen = if running {
        let top = client
            .inner()
            .top_processes(id, Some(TopOptions { ps_args: "-ef" }))
            .await;
        match top {
            Ok(top) => Some(
                top.processes
                    .unwrap_or_default()
                    .iter()
                    .any(|row| row.iter().any(|column| column.contains(binary))),
            ),
            // Exited between inspect and top
            Err(e) => {
                debug!("Listing processes of {} failed: {}", id, e);
                None
            }
        }
    } else {
        None
    };

    Ok(LaunchReport {
        path: info.path.unwrap_or_default(),
        args: info.args.unwrap_or_default(),
        running,
        exit_code: state.exit_code,
        process_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(path: &str, args: &[&str], process_seen: Option<bool>) -> LaunchReport {
        LaunchReport {
            path: path.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            running: process_seen.is_some(),
            exit_code: None,
            process_seen,
        }
    }

    const BINARY: &str = "/app/target/release/zer02prod";

    #[test]
    fn direct_launch_is_accepted() {
        assert!(report(BINARY, &[], Some(true)).is_direct_launch_of(BINARY));
        // Exited before the process list could be read
        assert!(report(BINARY, &[], None).is_direct_launch_of(BINARY));
    }

    #[test]
    fn shell_wrapper_is_rejected() {
        let wrapped = report("/bin/sh", &["-c", BINARY], Some(true));
        assert!(!wrapped.is_direct_launch_of(BINARY));
    }

    #[test]
    fn default_arguments_are_rejected() {
        let with_args = report(BINARY, &["--port", "8000"], Some(true));
        assert!(!with_args.is_direct_launch_of(BINARY));
    }

    #[test]
    fn missing_process_is_rejected() {
        assert!(!report(BINARY, &[], Some(false)).is_direct_launch_of(BINARY));
    }
}

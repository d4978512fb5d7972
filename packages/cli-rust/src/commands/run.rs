//! Run command implementation
//!
//! Starts the built image exactly as a deployment would: no command, no
//! entry point override, no extra arguments.

use std::io::Write;

use anyhow::{Result, anyhow};
use clap::Args;
use console::style;
use zer02prod_image_core::docker::{self, OutputStream, image_exists, run_image};

use super::connect_docker;
use crate::Project;
use crate::output::format_docker_error_anyhow;

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Image reference to run (default: the configured image)
    #[arg(long)]
    pub image: Option<String>,
}

/// Run the image in the foreground and return its exit code
///
/// Output goes to this process's stdout and stderr unchanged. The
/// container is removed when it exits or when Ctrl+C is pressed.
pub async fn cmd_run(args: &RunArgs, project: &Project, quiet: bool) -> Result<i32> {
    let image = args
        .image
        .clone()
        .unwrap_or_else(|| project.config.image_reference());

    let client = connect_docker(quiet, 0, None).await?;
    if !image_exists(&client, &image)
        .await
        .map_err(|e| format_docker_error_anyhow(&e))?
    {
        return Err(anyhow!(
            "Image {image} not found. Run '{}' first.",
            style("z2p-image build").cyan()
        ));
    }

    if !quiet {
        eprintln!(
            "{}",
            style(format!("Running {image} (Ctrl+C to stop)...")).dim()
        );
    }

    let name = format!("z2p-image-run-{}", docker::session_id());
    tracing::debug!("Starting container {} from {}", name, image);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let exit_code = run_image(&client, &image, &name, &mut |stream, bytes| {
        // Output is best effort; a closed pipe must not abort the container
        let _ = match stream {
            OutputStream::Stdout => stdout.write_all(bytes).and_then(|()| stdout.flush()),
            OutputStream::Stderr => stderr.write_all(bytes).and_then(|()| stderr.flush()),
        };
    })
    .await
    .map_err(|e| format_docker_error_anyhow(&e))?;

    if !quiet {
        eprintln!(
            "{}",
            style(format!("Container exited with code {exit_code}")).dim()
        );
    }
    Ok(process_exit_code(exit_code))
}

/// Map a container exit status onto a process exit code
fn process_exit_code(code: i64) -> i32 {
    i32::try_from(code).unwrap_or(1)
}

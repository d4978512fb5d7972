//! CLI command implementations
//!
//! This module contains the implementations for the build and inspection commands.

mod build;
mod config;
mod context;
mod doctor;
mod render;
mod reproduce;
mod run;
mod verify;

pub use build::{BuildArgs, cmd_build};
pub use config::{ConfigArgs, cmd_config};
pub use context::{ContextArgs, cmd_context};
pub use doctor::{DoctorArgs, cmd_doctor};
pub use render::{RenderArgs, cmd_render};
pub use reproduce::{ReproduceArgs, cmd_reproduce};
pub use run::{RunArgs, cmd_run};
pub use verify::{VerifyArgs, cmd_verify};

use anyhow::Result;
use console::style;
use zer02prod_image_core::docker::{DockerClient, DockerError};
use zer02prod_image_core::pipeline::BuildError;
use zer02prod_image_core::recipe::Stage;

use crate::output::{CommandSpinner, format_docker_error_anyhow};

/// Connect to Docker and ping it, with actionable error messages
///
/// `request_timeout` overrides bollard's default for long streaming calls.
pub(crate) async fn connect_docker(
    quiet: bool,
    verbose: u8,
    request_timeout: Option<std::time::Duration>,
) -> Result<DockerClient> {
    if verbose > 0 {
        eprintln!("{} Connecting to Docker...", style("[info]").cyan());
    }
    let spinner = CommandSpinner::new_maybe("Connecting to Docker...", quiet);

    let connected = match request_timeout {
        Some(timeout) => DockerClient::with_timeout(timeout),
        None => DockerClient::new(),
    };
    let client = match connected {
        Ok(client) => client,
        Err(e) => {
            spinner.fail("Cannot reach Docker");
            return Err(format_docker_error_anyhow(&e));
        }
    };

    if let Err(e) = client.verify_connection().await {
        spinner.fail("Cannot reach Docker");
        return Err(format_docker_error_anyhow(&e));
    }
    spinner.success("Connected to Docker");
    Ok(client)
}

/// Connect for a pipeline run; failures carry the engine exit code
pub(crate) async fn connect_engine(
    quiet: bool,
    verbose: u8,
    request_timeout: std::time::Duration,
) -> Result<DockerClient, BuildError> {
    if verbose > 0 {
        eprintln!("{} Connecting to Docker...", style("[info]").cyan());
    }
    let spinner = CommandSpinner::new_maybe("Connecting to Docker...", quiet);

    let connected = async {
        let client = DockerClient::with_timeout(request_timeout)?;
        client.verify_connection().await?;
        Ok::<_, DockerError>(client)
    }
    .await;

    match connected {
        Ok(client) => {
            spinner.success("Connected to Docker");
            Ok(client)
        }
        Err(source) => {
            spinner.fail("Cannot reach Docker");
            Err(BuildError::Engine {
                stage: Stage::SelectBase,
                source,
            })
        }
    }
}

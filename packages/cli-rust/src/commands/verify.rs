//! Verify command implementation
//!
//! Confirms that the runtime launches the compiled binary itself as the
//! container's process, without a shell or default arguments.

use anyhow::{Result, anyhow};
use clap::Args;
use console::style;
use zer02prod_image_core::recipe::Recipe;
use zer02prod_image_core::docker::{self, LaunchReport, image_exists, inspect_launch};
use zer02prod_image_core::pipeline::BuildError;

use super::connect_docker;
use crate::Project;
use crate::output::{CommandSpinner, format_docker_error_anyhow};

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// Image reference to verify (default: the configured image)
    #[arg(long)]
    pub image: Option<String>,
}

pub async fn cmd_verify(args: &VerifyArgs, project: &Project, quiet: bool) -> Result<()> {
    let recipe = Recipe::from_config(&project.config)
        .map_err(|e| BuildError::Configuration(e.to_string()))?;
    let binary = recipe.entrypoint.path.clone();
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

    let spinner = CommandSpinner::new_maybe(&format!("Starting {image}..."), quiet);
    let name = format!("z2p-image-verify-{}", docker::session_id());
    let report = match inspect_launch(&client, &image, &name, &binary).await {
        Ok(report) => report,
        Err(e) => {
            spinner.fail("Could not start the image");
            return Err(format_docker_error_anyhow(&e));
        }
    };

    if let Some(problem) = launch_problem(&report, &binary) {
        spinner.fail("Entry point is not the binary");
        return Err(BuildError::EntryPointBinding(problem).into());
    }
    spinner.success("Entry point verified");

    if !quiet {
        println!();
        println!("Process:    {}", style(&report.path).cyan());
        println!("Arguments:  {}", style("(none)").dim());
        let state = match (report.running, report.exit_code) {
            (true, _) => style("running".to_string()).green(),
            (false, Some(code)) => style(format!("exited ({code})")).yellow(),
            (false, None) => style("exited".to_string()).yellow(),
        };
        println!("State:      {state}");
        if report.process_seen.is_none() {
            println!(
                "{}",
                style("The binary exited before the process list could be read").dim()
            );
        }
    }
    Ok(())
}

/// Why the launch is not a direct start of `binary`, if it is not
fn launch_problem(report: &LaunchReport, binary: &str) -> Option<String> {
    if report.is_direct_launch_of(binary) {
        return None;
    }
    if report.path != binary {
        return Some(format!(
            "The runtime launched {:?} instead of {binary}",
            report.path
        ));
    }
    if !report.args.is_empty() {
        return Some(format!(
            "The binary was started with arguments {:?}; it must start without any",
            report.args
        ));
    }
    Some(format!("{binary} does not appear in the container's process list"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINARY: &str = "/app/target/release/zer02prod";

    fn report(path: &str, args: &[&str], seen: Option<bool>) -> LaunchReport {
        LaunchReport {
            path: path.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            running: true,
            exit_code: None,
            process_seen: seen,
        }
    }

    #[test]
    fn direct_launch_passes() {
        assert_eq!(launch_problem(&report(BINARY, &[], Some(true)), BINARY), None);
        assert_eq!(launch_problem(&report(BINARY, &[], None), BINARY), None);
    }

    #[test]
    fn shell_wrapper_is_reported() {
        let problem = launch_problem(&report("/bin/sh", &["-c", BINARY], Some(true)), BINARY);
        assert!(problem.unwrap().contains("/bin/sh"));
    }

    #[test]
    fn default_arguments_are_reported() {
        let problem = launch_problem(&report(BINARY, &["--port", "8000"], Some(true)), BINARY);
        assert!(problem.unwrap().contains("--port"));
    }

    #[test]
    fn missing_process_is_reported() {
        let problem = launch_problem(&report(BINARY, &[], Some(false)), BINARY);
        assert!(problem.unwrap().contains("process list"));
    }
}

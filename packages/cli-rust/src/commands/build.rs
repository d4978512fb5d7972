//! Build command implementation
//!
//! Runs the staged pipeline against the local daemon and prints a report.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use zer02prod_image_core::Config;
use zer02prod_image_core::config::schema::validate_image_tag;
use zer02prod_image_core::docker::{BUILD_REQUEST_TIMEOUT, ProgressReporter};
use zer02prod_image_core::pipeline::{
    BuildError, BuildReport, DockerEngine, Pipeline, PipelineOptions,
};
use zer02prod_image_core::recipe::Stage;

use super::connect_engine;
use crate::Project;
use crate::output::{short_id, stage_counter, stage_style};

/// Arguments for the build command
#[derive(Args)]
pub struct BuildArgs {
    /// Ignore the daemon layer cache and any previous build
    #[arg(long)]
    pub no_cache: bool,

    /// Tag to apply instead of the configured image_tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Overall build limit, e.g. "45m" (default: build_timeout_secs)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Print the build report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Build the image
///
/// In quiet mode only the final image reference is printed, for scripting.
pub async fn cmd_build(args: &BuildArgs, project: &Project, quiet: bool, verbose: u8) -> Result<()> {
    let config = effective_config(args, &project.config)?;
    let options = PipelineOptions::from_config(&config, &project.root)?;
    tracing::debug!("Pipeline options: {:?}", options);

    if verbose > 0 {
        eprintln!(
            "{} Building {} from {}{}",
            style("[info]").cyan(),
            options.image_reference(),
            options.source_root.display(),
            if options.no_cache { " (no cache)" } else { "" }
        );
    }

    let client = connect_engine(quiet, verbose, BUILD_REQUEST_TIMEOUT.max(options.timeout)).await?;
    let mut progress = if quiet || args.json {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    };
    progress.set_context(options.image_reference());

    let show_stages = !quiet && !args.json;
    let mut pipeline =
        Pipeline::new(DockerEngine::new(client, progress), options).on_stage(move |stage| {
            if show_stages {
                print_stage(stage);
            }
        });

    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            pipeline.engine().progress_mut().abandon_all("Build failed");
            return Err(e.into());
        }
    };
    pipeline.engine().progress_mut().finish_all("Build complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if quiet {
        println!("{}", report.image);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Configuration with command-line overrides applied
fn effective_config(args: &BuildArgs, config: &Config) -> Result<Config, BuildError> {
    let mut config = config.clone();
    if args.no_cache {
        config.no_cache = true;
    }
    if let Some(tag) = &args.tag {
        validate_image_tag(tag).map_err(BuildError::Configuration)?;
        config.image_tag = tag.clone();
    }
    if let Some(timeout) = args.timeout {
        if timeout.as_secs() == 0 {
            return Err(BuildError::Configuration(
                "--timeout must be at least one second".to_string(),
            ));
        }
        config.build_timeout_secs = timeout.as_secs();
    }
    Ok(config)
}

fn print_stage(stage: Stage) {
    if stage.is_terminal() {
        return;
    }
    eprintln!("{} {}", style(stage_counter(stage)).dim(), stage_style(stage));
}

fn print_report(report: &BuildReport) {
    for warning in &report.warnings {
        eprintln!("{} {}", style("Warning:").yellow(), warning);
    }

    println!();
    if report.cached {
        println!(
            "{}",
            style("Sources and recipe unchanged; reusing the previous image").dim()
        );
    }
    println!("Image:        {}", style(&report.image).cyan());
    println!("ID:           {}", short_id(&report.image_id));
    println!("Entry point:  {}", report.entrypoint.join(" "));
    println!("Fingerprint:  {}", short_id(&report.fingerprint));
    println!(
        "Elapsed:      {}",
        humantime::format_duration(Duration::from_secs(report.elapsed.as_secs()))
    );

    if !report.cached && !report.timings.is_empty() {
        println!();
        for timing in &report.timings {
            println!(
                "  {:<28} {}",
                timing.stage.label(),
                style(humantime::format_duration(Duration::from_millis(
                    u64::try_from(timing.elapsed.as_millis()).unwrap_or(u64::MAX)
                )))
                .dim()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> BuildArgs {
        BuildArgs {
            no_cache: false,
            tag: None,
            timeout: None,
            json: false,
        }
    }

    #[test]
    fn no_overrides_keep_config() {
        let config = Config::default();
        assert_eq!(effective_config(&args(), &config).unwrap(), config);
    }

    #[test]
    fn overrides_are_applied() {
        let args = BuildArgs {
            no_cache: true,
            tag: Some("v2".to_string()),
            timeout: Some(Duration::from_secs(45 * 60)),
            ..args()
        };
        let config = effective_config(&args, &Config::default()).unwrap();
        assert!(config.no_cache);
        assert_eq!(config.image_tag, "v2");
        assert_eq!(config.build_timeout_secs, 2700);
    }

    #[test]
    fn invalid_tag_is_a_configuration_failure() {
        let args = BuildArgs {
            tag: Some("-bad".to_string()),
            ..args()
        };
        let err = effective_config(&args, &Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn sub_second_timeout_is_rejected() {
        let args = BuildArgs {
            timeout: Some(Duration::from_millis(300)),
            ..args()
        };
        assert!(effective_config(&args, &Config::default()).is_err());
    }
}

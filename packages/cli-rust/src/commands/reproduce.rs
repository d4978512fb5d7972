//! Reproduce command implementation
//!
//! Builds the image twice without any cache and compares the binaries.

use anyhow::Result;
use clap::Args;
use console::style;
use zer02prod_image_core::docker::{BUILD_REQUEST_TIMEOUT, ProgressReporter};
use zer02prod_image_core::pipeline::{
    DockerEngine, PipelineOptions, ReproducibilityReport, check_reproducibility,
};

use super::connect_engine;
use crate::Project;
use crate::output::short_id;

/// Arguments for the reproduce command
#[derive(Args)]
pub struct ReproduceArgs {
    /// Print the comparison as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Exits 0 when both builds produced a byte-identical binary, 1 otherwise
pub async fn cmd_reproduce(args: &ReproduceArgs, project: &Project, quiet: bool) -> Result<i32> {
    let options = PipelineOptions::from_config(&project.config, &project.root)?;
    let client = connect_engine(quiet, 0, BUILD_REQUEST_TIMEOUT.max(options.timeout)).await?;

    let mut progress = if quiet || args.json {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    };
    progress.set_context(format!("{} (clean build x2)", options.image_reference()));

    let (report, mut engine) =
        check_reproducibility(DockerEngine::new(client, progress), options).await?;
    engine.progress_mut().finish_all("Builds complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_comparison(&report);
    }
    Ok(if report.identical() { 0 } else { 1 })
}

fn print_comparison(report: &ReproducibilityReport) {
    println!();
    println!("Binary:        {}", report.binary_path);
    println!(
        "First build:   {}  (image {})",
        report.first_digest,
        short_id(&report.first.image_id)
    );
    println!(
        "Second build:  {}  (image {})",
        report.second_digest,
        short_id(&report.second.image_id)
    );
    println!();
    if report.identical() {
        println!("{}", style("Binaries are byte-identical").green().bold());
    } else {
        println!("{}", style("Binaries differ between builds").red().bold());
        println!(
            "  {} Embedded paths, timestamps or an unlocked dependency graph are common causes; try \"locked\": true.",
            style("Tip:").cyan()
        );
    }
}

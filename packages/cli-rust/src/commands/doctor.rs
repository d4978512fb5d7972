//! Doctor command implementation
//!
//! Runs every check a build depends on without building anything.

use anyhow::Result;
use clap::Args;
use console::style;
use zer02prod_image_core::config;
use zer02prod_image_core::context::collect_source_tree;
use zer02prod_image_core::docker::{DockerClient, image_exists};
use zer02prod_image_core::get_version_long;
use zer02prod_image_core::pipeline::{PipelineOptions, load_record, run_preflight};
use zer02prod_image_core::recipe::Recipe;

use crate::Project;
use crate::output::{CheckStatus, check_marker, format_docker_error, short_id};

/// Arguments for the doctor command
#[derive(Args)]
pub struct DoctorArgs {}

struct Check {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

/// Exits 0 when no check failed, 1 otherwise
pub async fn cmd_doctor(_args: &DoctorArgs, project: &Project, quiet: bool) -> Result<i32> {
    let mut checks = Vec::new();

    let recipe = match Recipe::from_config(&project.config) {
        Ok(recipe) => {
            let origin = if project.config_path.exists() {
                project.config_path.display().to_string()
            } else {
                "defaults (no config file)".to_string()
            };
            checks.push(Check::new("configuration", CheckStatus::Ok, origin));
            if !recipe.base.is_pinned() {
                checks.push(Check::new(
                    "base image",
                    CheckStatus::Warn,
                    format!("{} is not pinned; builds are not reproducible", recipe.base),
                ));
            } else {
                checks.push(Check::new("base image", CheckStatus::Ok, recipe.base.to_string()));
            }
            Some(recipe)
        }
        Err(e) => {
            checks.push(Check::new("configuration", CheckStatus::Fail, e.to_string()));
            None
        }
    };

    let client = match connect().await {
        Ok((client, version)) => {
            checks.push(Check::new("docker", CheckStatus::Ok, version));
            Some(client)
        }
        Err(detail) => {
            checks.push(Check::new("docker", CheckStatus::Fail, detail));
            None
        }
    };

    if let (Some(client), Some(recipe)) = (&client, &recipe) {
        let base = recipe.base.to_string();
        let (status, detail) = match image_exists(client, &base).await {
            Ok(true) => (CheckStatus::Ok, format!("{base} is present locally")),
            Ok(false) => (CheckStatus::Warn, format!("{base} will be pulled on the next build")),
            Err(e) => (CheckStatus::Fail, e.to_string()),
        };
        checks.push(Check::new("base image cache", status, detail));
    }

    if recipe.is_some() {
        check_sources(project, &mut checks);
    }
    check_last_build(project, client.as_ref(), &mut checks).await;

    if !quiet {
        println!("{} {}", style("z2p-image").cyan().bold(), style(get_version_long()).dim());
        println!();
    }
    for check in &checks {
        if quiet && check.status == CheckStatus::Ok {
            continue;
        }
        println!(
            "{} {:<18} {}",
            check_marker(check.status),
            check.name,
            check.detail
        );
    }
    Ok(exit_code(&checks))
}

async fn connect() -> Result<(DockerClient, String), String> {
    let client = DockerClient::new().map_err(|e| format_docker_error(&e))?;
    client
        .verify_connection()
        .await
        .map_err(|e| format_docker_error(&e))?;
    let version = client.version().await.map_err(|e| format_docker_error(&e))?;
    Ok((client, version))
}

fn check_sources(project: &Project, checks: &mut Vec<Check>) {
    let options = match PipelineOptions::from_config(&project.config, &project.root) {
        Ok(options) => options,
        Err(e) => {
            checks.push(Check::new("source tree", CheckStatus::Fail, e.to_string()));
            return;
        }
    };
    let tree = match collect_source_tree(&options.source_root, &options.manifest) {
        Ok(tree) => tree,
        Err(e) => {
            checks.push(Check::new("source tree", CheckStatus::Fail, e.to_string()));
            return;
        }
    };
    checks.push(Check::new(
        "source tree",
        CheckStatus::Ok,
        format!(
            "{} files, {}",
            tree.files().len(),
            indicatif::HumanBytes(tree.total_size())
        ),
    ));

    match run_preflight(&options.source_root, &options.recipe, &tree) {
        Ok(report) => {
            checks.push(Check::new(
                "binary target",
                CheckStatus::Ok,
                format!(
                    "{} from {}",
                    options.recipe.compile.binary,
                    report.binary_source.display()
                ),
            ));
            let metadata = match &report.offline_metadata {
                Some(path) => Check::new(
                    "query metadata",
                    CheckStatus::Ok,
                    format!("offline, {}", path.display()),
                ),
                None => Check::new("query metadata", CheckStatus::Warn, "online"),
            };
            checks.push(metadata);
            for warning in report.warnings {
                checks.push(Check::new("preflight", CheckStatus::Warn, warning));
            }
        }
        Err(e) => checks.push(Check::new("preflight", CheckStatus::Fail, e.to_string())),
    }
}

async fn check_last_build(project: &Project, client: Option<&DockerClient>, checks: &mut Vec<Check>) {
    let reference = project.config.image_reference();
    let Some(dir) = config::get_records_dir() else {
        checks.push(Check::new("last build", CheckStatus::Warn, "no data directory"));
        return;
    };
    let Some(record) = load_record(&dir, &reference) else {
        checks.push(Check::new(
            "last build",
            CheckStatus::Warn,
            format!("{reference} has not been built yet"),
        ));
        return;
    };

    let built = format!(
        "{reference} ({}) built {}",
        short_id(&record.image_id),
        record.built_at.format("%Y-%m-%d %H:%M UTC")
    );
    let present = match client {
        Some(client) => image_exists(client, &record.image_id).await.unwrap_or(false),
        None => true,
    };
    if present {
        checks.push(Check::new("last build", CheckStatus::Ok, built));
    } else {
        checks.push(Check::new(
            "last build",
            CheckStatus::Warn,
            format!("{built}, image no longer present"),
        ));
    }
}

fn exit_code(checks: &[Check]) -> i32 {
    if checks.iter().any(|c| c.status == CheckStatus::Fail) {
        1
    } else {
        0
    }
}

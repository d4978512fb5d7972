//! Context command implementation
//!
//! Shows exactly what `build` would hand to the daemon.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::HumanBytes;
use serde::Serialize;
use zer02prod_image_core::context::{EntryKind, SourceTree, archive_path, collect_source_tree};
use zer02prod_image_core::pipeline::{BuildError, PipelineOptions};

use crate::Project;

/// Arguments for the context command
#[derive(Args)]
pub struct ContextArgs {
    /// Only print the summary line
    #[arg(long)]
    pub summary: bool,

    /// Output as JSON instead of a file list
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ContextListing {
    files: Vec<ListedFile>,
    total_size: u64,
    digest: String,
}

#[derive(Serialize)]
struct ListedFile {
    path: String,
    mode: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_target: Option<String>,
}

/// List the files of the build context with total size and source digest
pub fn cmd_context(args: &ContextArgs, project: &Project, quiet: bool) -> Result<()> {
    let options = PipelineOptions::from_config(&project.config, &project.root)?;
    let tree = collect_source_tree(&options.source_root, &options.manifest)
        .map_err(|e| BuildError::SourceMaterialization(e.to_string()))?;
    let listing = listing(&tree).context("Failed to hash the source tree")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if !args.summary {
        for file in &listing.files {
            let target = file
                .link_target
                .as_ref()
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default();
            println!(
                "{} {:>10}  {}{}",
                style(&file.mode).dim(),
                HumanBytes(file.size).to_string(),
                file.path,
                target
            );
        }
        if !quiet {
            println!();
        }
    }

    if quiet {
        println!("{}", listing.digest);
    } else {
        println!(
            "{} files, {}, digest {}",
            listing.files.len(),
            HumanBytes(listing.total_size),
            style(&listing.digest).cyan()
        );
    }
    Ok(())
}

fn listing(tree: &SourceTree) -> Result<ContextListing> {
    let files = tree
        .files()
        .iter()
        .map(|file| ListedFile {
            path: archive_path(&file.relative),
            mode: format!("{:04o}", file.mode),
            size: file.size,
            link_target: match &file.kind {
                EntryKind::File => None,
                EntryKind::Symlink(target) => Some(target.display().to_string()),
            },
        })
        .collect();

    Ok(ContextListing {
        files,
        total_size: tree.total_size(),
        digest: tree.digest()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zer02prod_image_core::context::IgnoreManifest;

    #[test]
    fn listing_matches_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::create_dir_all(dir.path().join("target/release")).unwrap();
        std::fs::write(dir.path().join("target/release/zer02prod"), "bin").unwrap();

        let manifest = IgnoreManifest::load(dir.path(), &[], &[]).unwrap();
        let tree = collect_source_tree(dir.path(), &manifest).unwrap();
        let listing = listing(&tree).unwrap();

        let paths: Vec<&str> = listing.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.toml", "src/main.rs"]);
        assert_eq!(listing.total_size, tree.total_size());
        assert_eq!(listing.digest, tree.digest().unwrap());
        assert!(listing.files.iter().all(|f| f.mode == "0644"));
    }
}

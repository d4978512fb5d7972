//! Config subcommand implementations
//!
//! Provides `z2p-image config` subcommands for viewing and changing the
//! project configuration.

mod get;
mod set;
mod show;

use anyhow::Result;
use clap::{Args, Subcommand};

pub use get::cmd_config_get;
pub use set::cmd_config_set;
pub use show::cmd_config_show;

use crate::Project;

/// Configuration command arguments
#[derive(Args)]
pub struct ConfigArgs {
    /// Output as JSON instead of table format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

/// Configuration management subcommands
#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Show current configuration
    Show {
        /// Output as JSON instead of table format
        #[arg(long)]
        json: bool,
    },
    /// Get a single configuration value
    Get {
        /// Configuration key (e.g., "tag", "base_image", "compile_flags")
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Configuration key to set (e.g., "tag", "packages", "timeout")
        key: String,
        /// Value to set; lists are comma separated
        value: String,
    },
}

/// Handle config command
///
/// Routes to the appropriate handler based on the subcommand.
/// If no subcommand is given, defaults to Show.
pub fn cmd_config(args: ConfigArgs, project: &Project, quiet: bool) -> Result<()> {
    match args.command {
        Some(ConfigSubcommands::Show { json }) => cmd_config_show(project, json, quiet),
        Some(ConfigSubcommands::Get { key }) => cmd_config_get(&project.config, &key),
        Some(ConfigSubcommands::Set { key, value }) => {
            cmd_config_set(&project.config_path, &key, &value, quiet)
        }
        None => cmd_config_show(project, args.json, quiet),
    }
}

/// Resolve a key or one of its short aliases to the schema field name
pub(crate) fn canonical_key(key: &str) -> Option<&'static str> {
    let key = match key.to_lowercase().as_str() {
        "version" => "version",
        "image_name" | "name" | "image" => "image_name",
        "image_tag" | "tag" => "image_tag",
        "base_image" | "base" => "base_image",
        "allow_floating_base" | "floating" => "allow_floating_base",
        "build_packages" | "packages" => "build_packages",
        "workdir" => "workdir",
        "binary_name" | "binary" => "binary_name",
        "compile_flags" | "flags" => "compile_flags",
        "locked" => "locked",
        "include" => "include",
        "exclude" => "exclude",
        "build_timeout_secs" | "timeout" => "build_timeout_secs",
        "no_cache" => "no_cache",
        _ => return None,
    };
    Some(key)
}

pub(crate) const VALID_KEYS: &str = "Valid keys:\n  \
      version\n  \
      image_name / name\n  \
      image_tag / tag\n  \
      base_image / base\n  \
      allow_floating_base / floating\n  \
      build_packages / packages\n  \
      workdir\n  \
      binary_name / binary\n  \
      compile_flags / flags\n  \
      locked\n  \
      include\n  \
      exclude\n  \
      build_timeout_secs / timeout\n  \
      no_cache";

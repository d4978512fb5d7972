//! Config set subcommand
//!
//! Sets a single configuration value and writes the project file.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use zer02prod_image_core::config::schema::{validate_image_name, validate_image_tag};
use zer02prod_image_core::recipe::Recipe;
use zer02prod_image_core::{Config, load_config, save_config};

use super::{VALID_KEYS, canonical_key};

/// Set a configuration value
///
/// The whole configuration is validated before anything is written, so a
/// rejected value leaves the file untouched.
pub fn cmd_config_set(config_path: &Path, key: &str, value: &str, quiet: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    let display_value = apply_value(&mut config, key, value)?;
    validate(&config)?;

    save_config(&config, config_path)?;

    if !quiet {
        println!(
            "{} Set {} = {}",
            style("Success:").green().bold(),
            key,
            display_value
        );
        println!(
            "{}",
            style(format!("Saved to {}", config_path.display())).dim()
        );
    }
    Ok(())
}

/// Parse `value` into the field named by `key`; returns the value as stored
fn apply_value(config: &mut Config, key: &str, value: &str) -> Result<String> {
    let Some(canonical) = canonical_key(key) else {
        bail!("Unknown configuration key: {key}\n\n{VALID_KEYS}");
    };

    match canonical {
        "version" => bail!("version is managed by z2p-image and cannot be set"),
        "image_name" => config.image_name = value.to_string(),
        "image_tag" => config.image_tag = value.to_string(),
        "base_image" => config.base_image = value.to_string(),
        "allow_floating_base" => config.allow_floating_base = parse_bool(value)?,
        "build_packages" => config.build_packages = parse_list(value),
        "workdir" => config.workdir = value.to_string(),
        "binary_name" => config.binary_name = value.to_string(),
        "compile_flags" => config.compile_flags = parse_list(value),
        "locked" => config.locked = parse_bool(value)?,
        "include" => config.include = parse_list(value),
        "exclude" => config.exclude = parse_list(value),
        "build_timeout_secs" => config.build_timeout_secs = parse_timeout(value)?,
        "no_cache" => config.no_cache = parse_bool(value)?,
        other => bail!("Unknown configuration key: {other}"),
    }
    super::get::config_value(config, canonical)
}

fn validate(config: &Config) -> Result<()> {
    validate_image_name(&config.image_name).map_err(|e| anyhow!(e))?;
    validate_image_tag(&config.image_tag).map_err(|e| anyhow!(e))?;
    Recipe::from_config(config).context("The new value makes the build recipe invalid")?;
    if config.build_timeout_secs == 0 {
        bail!("build_timeout_secs must be greater than zero");
    }
    Ok(())
}

/// Comma separated list; empty input clears the list
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => bail!("Invalid boolean value: {s}. Use: true/false, yes/no, or 1/0"),
    }
}

/// Seconds, or a duration such as "45m"
fn parse_timeout(value: &str) -> Result<u64> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(value)
        .map(|d| d.as_secs())
        .map_err(|e| anyhow!("Invalid timeout: {value} ({e}). Use seconds or e.g. \"45m\""))
}

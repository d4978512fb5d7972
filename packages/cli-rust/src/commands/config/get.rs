//! Config get subcommand
//!
//! Retrieves a single configuration value by key.

use anyhow::{Result, bail};
use zer02prod_image_core::Config;

use super::{VALID_KEYS, canonical_key};

/// Get a single configuration value
///
/// Outputs just the value (no formatting) for scripting. Lists are
/// printed as JSON arrays.
pub fn cmd_config_get(config: &Config, key: &str) -> Result<()> {
    println!("{}", config_value(config, key)?);
    Ok(())
}

pub(crate) fn config_value(config: &Config, key: &str) -> Result<String> {
    let Some(canonical) = canonical_key(key) else {
        bail!("Unknown configuration key: {key}\n\n{VALID_KEYS}");
    };

    let value = match canonical {
        "version" => config.version.to_string(),
        "image_name" => config.image_name.clone(),
        "image_tag" => config.image_tag.clone(),
        "base_image" => config.base_image.clone(),
        "allow_floating_base" => config.allow_floating_base.to_string(),
        "build_packages" => serde_json::to_string(&config.build_packages)?,
        "workdir" => config.workdir.clone(),
        "binary_name" => config.binary_name.clone(),
        "compile_flags" => serde_json::to_string(&config.compile_flags)?,
        "locked" => config.locked.to_string(),
        "include" => serde_json::to_string(&config.include)?,
        "exclude" => serde_json::to_string(&config.exclude)?,
        "build_timeout_secs" => config.build_timeout_secs.to_string(),
        "no_cache" => config.no_cache.to_string(),
        other => bail!("Unknown configuration key: {other}"),
    };
    Ok(value)
}

//! Configuration management for z2p-image
//!
//! Handles loading, saving, and validating the JSONC project configuration.
//! A missing file means "all defaults"; unknown keys are rejected.

pub mod paths;
pub mod schema;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use jsonc_parser::parse_to_serde_value;

pub use paths::{CONFIG_FILE_NAME, get_config_path, get_data_dir, get_records_dir};
pub use schema::Config;

/// Load configuration from a config file
///
/// If the file doesn't exist, returns the default configuration without
/// writing anything into the source tree.
/// Supports JSONC (JSON with comments).
/// Rejects unknown fields for strict validation.
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        tracing::debug!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        return Ok(Config::default());
    }

    let mut file = File::open(config_path)
        .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    parse_config(&contents).with_context(|| {
        format!(
            "Invalid configuration in {}. Check for unknown fields or invalid values.",
            config_path.display()
        )
    })
}

/// Parse JSONC configuration text
pub fn parse_config(contents: &str) -> Result<Config> {
    let parsed_value = parse_to_serde_value(contents, &Default::default())
        .map_err(|e| anyhow::anyhow!("Invalid JSONC in config file: {}", e))?
        .ok_or_else(|| anyhow::anyhow!("Config file is empty"))?;

    // deny_unknown_fields rejects unknown keys here
    let config: Config = serde_json::from_value(parsed_value)?;
    Ok(config)
}

/// Save configuration to a config file
///
/// Creates a backup of the existing config (z2p-image.jsonc.bak) before overwriting.
pub fn save_config(config: &Config, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
    }

    if config_path.exists() {
        let backup_path = config_path.with_extension("jsonc.bak");
        fs::copy(config_path, &backup_path)
            .with_context(|| format!("Failed to create backup at: {}", backup_path.display()))?;
        tracing::debug!("Created config backup: {}", backup_path.display());
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

    let mut file = File::create(config_path)
        .with_context(|| format!("Failed to create config file: {}", config_path.display()))?;

    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    tracing::debug!("Saved config to: {}", config_path.display());

    Ok(())
}

//! Configuration schema for z2p-image
//!
//! Defines the structure and defaults for the `z2p-image.jsonc` project file.

use serde::{Deserialize, Serialize};

/// Main configuration structure for z2p-image
///
/// Serialized to/from `<source root>/z2p-image.jsonc`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Config file version for migrations
    pub version: u32,

    /// Repository name of the produced image (default: "zer02prod")
    #[serde(default = "default_image_name")]
    pub image_name: String,

    /// Tag applied to the produced image once it is verified (default: "local")
    #[serde(default = "default_image_tag")]
    pub image_tag: String,

    /// Toolchain image the build starts from
    /// Must carry an explicit version tag or a sha256 digest
    #[serde(default = "default_base_image")]
    pub base_image: String,

    /// Accept an untagged or `latest` base image (default: false)
    #[serde(default)]
    pub allow_floating_base: bool,

    /// System packages installed before compiling (default: lld, clang)
    #[serde(default = "default_build_packages")]
    pub build_packages: Vec<String>,

    /// Absolute working directory inside the build environment (default: "/app")
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Name of the release binary bound as the entry point (default: "zer02prod")
    #[serde(default = "default_binary_name")]
    pub binary_name: String,

    /// Compile-time flags handed to the compiler invocation
    /// Format: ["KEY=value", "KEY2=value2"]
    #[serde(default = "default_compile_flags")]
    pub compile_flags: Vec<String>,

    /// Pass `--locked` to cargo (default: false)
    #[serde(default)]
    pub locked: bool,

    /// Only send files matching these patterns (default: empty = everything not excluded)
    #[serde(default)]
    pub include: Vec<String>,

    /// Extra exclusion patterns, applied after `.dockerignore`
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Upper bound for a whole build in seconds (default: 1800)
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    /// Build without the daemon layer cache and without reusing a previous build
    #[serde(default)]
    pub no_cache: bool,
}

fn default_image_name() -> String {
    "zer02prod".to_string()
}

fn default_image_tag() -> String {
    "local".to_string()
}

fn default_base_image() -> String {
    "rust:1.83.0-bookworm".to_string()
}

fn default_build_packages() -> Vec<String> {
    vec!["lld".to_string(), "clang".to_string()]
}

fn default_workdir() -> String {
    "/app".to_string()
}

fn default_binary_name() -> String {
    "zer02prod".to_string()
}

fn default_compile_flags() -> Vec<String> {
    vec!["SQLX_OFFLINE=true".to_string()]
}

fn default_build_timeout_secs() -> u64 {
    1800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            image_name: default_image_name(),
            image_tag: default_image_tag(),
            base_image: default_base_image(),
            allow_floating_base: false,
            build_packages: default_build_packages(),
            workdir: default_workdir(),
            binary_name: default_binary_name(),
            compile_flags: default_compile_flags(),
            locked: false,
            include: Vec::new(),
            exclude: Vec::new(),
            build_timeout_secs: default_build_timeout_secs(),
            no_cache: false,
        }
    }
}

impl Config {
    /// Create a new Config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Full reference of the final image, `name:tag`
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}

/// Validate a docker image tag
///
/// Tags are 1-128 characters of `[A-Za-z0-9_.-]` and may not start with `.` or `-`.
pub fn validate_image_tag(tag: &str) -> Result<(), String> {
    let valid_chars = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if tag.is_empty()
        || tag.len() > 128
        || !valid_chars
        || tag.starts_with('.')
        || tag.starts_with('-')
    {
        return Err(format!(
            "Invalid image tag: '{tag}'. Use up to 128 letters, digits, '_', '.' or '-'"
        ));
    }
    Ok(())
}

/// Validate a docker repository name (lowercase path components)
pub fn validate_image_name(name: &str) -> Result<(), String> {
    let valid = !name.is_empty()
        && name.split('/').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-' | ':')
                })
        });
    if valid {
        Ok(())
    } else {
        Err(format!(
            "Invalid image name: '{name}'. Use lowercase letters, digits, '.', '_', '-' and '/'"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.image_name, "zer02prod");
        assert_eq!(config.image_tag, "local");
        assert_eq!(config.base_image, "rust:1.83.0-bookworm");
        assert!(!config.allow_floating_base);
        assert_eq!(config.build_packages, vec!["lld", "clang"]);
        assert_eq!(config.workdir, "/app");
        assert_eq!(config.binary_name, "zer02prod");
        assert_eq!(config.compile_flags, vec!["SQLX_OFFLINE=true"]);
        assert!(!config.locked);
        assert!(config.include.is_empty());
        assert!(config.exclude.is_empty());
        assert_eq!(config.build_timeout_secs, 1800);
        assert!(!config.no_cache);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let json = r#"{"version": 1}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_deserialize_overrides() {
        let json = r#"{
            "version": 1,
            "base_image": "rust@sha256:0000000000000000000000000000000000000000000000000000000000000000",
            "build_packages": ["mold"],
            "compile_flags": [],
            "exclude": ["docs/"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.base_image.contains("@sha256:"));
        assert_eq!(config.build_packages, vec!["mold"]);
        assert!(config.compile_flags.is_empty());
        assert_eq!(config.exclude, vec!["docs/"]);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let json = r#"{"version": 1, "entrypoint_shell": true}"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_image_reference() {
        let config = Config::default();
        assert_eq!(config.image_reference(), "zer02prod:local");
    }

    #[test]
    fn test_validate_image_tag() {
        assert!(validate_image_tag("local").is_ok());
        assert!(validate_image_tag("v1.2.3-rc_1").is_ok());
        assert!(validate_image_tag("").is_err());
        assert!(validate_image_tag(".hidden").is_err());
        assert!(validate_image_tag("-dash").is_err());
        assert!(validate_image_tag("has space").is_err());
        assert!(validate_image_tag(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_image_name() {
        assert!(validate_image_name("zer02prod").is_ok());
        assert!(validate_image_name("registry.local:5000/team/zer02prod").is_ok());
        assert!(validate_image_name("Zer02Prod").is_err());
        assert!(validate_image_name("team//app").is_err());
        assert!(validate_image_name("").is_err());
    }
}

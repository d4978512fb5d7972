//! Build recipe model
//!
//! This module turns the loose configuration into a typed recipe:
//! - Pinned base toolchain image
//! - Build dependency packages
//! - Working directory and compile step with explicit compile-time flags
//! - Exec-form entry point bound to the compiled binary
//! - The stage state machine and the Dockerfile rendering

mod base;
mod dockerfile;
mod stage;

use std::collections::HashMap;

use thiserror::Error;

use crate::config::Config;

pub use base::BaseImage;
pub use dockerfile::{DOCKERFILE_NAME, Instruction, RenderedDockerfile, render};
pub use stage::{PipelineState, Stage, StageTiming};

/// Flag that makes sqlx compile-time checks read captured query metadata
pub const OFFLINE_FLAG: &str = "SQLX_OFFLINE";

/// Errors raised while assembling a recipe
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Base image reference could not be parsed
    #[error("Invalid base image '{reference}': {reason}")]
    InvalidBaseImage { reference: String, reason: String },

    /// Base image is not pinned to a version or digest
    #[error(
        "Base image '{0}' is not pinned. Use an explicit version tag or a sha256 digest, or set allow_floating_base."
    )]
    FloatingBaseImage(String),

    /// Working directory is not absolute
    #[error("Working directory must be an absolute path, got '{0}'")]
    RelativeWorkdir(String),

    /// Binary name is empty or has characters cargo rejects
    #[error("Invalid binary name '{0}'")]
    InvalidBinaryName(String),

    /// Package name would not be safe to pass to apt-get
    #[error("Invalid build package name '{0}'")]
    InvalidPackage(String),

    /// Compile flag is not `KEY=value` with a valid key
    #[error("Invalid compile flag '{0}'. Use KEY=value with KEY made of letters, digits and '_'")]
    InvalidFlag(String),

    /// State machine was asked to move somewhere it cannot go
    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

/// A compile-time flag passed to the compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFlag {
    pub name: String,
    pub value: String,
}

impl BuildFlag {
    /// Parse a `KEY=value` pair
    pub fn parse(raw: &str) -> Result<Self, RecipeError> {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| RecipeError::InvalidFlag(raw.to_string()))?;
        let name = name.trim();
        let valid_name = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(RecipeError::InvalidFlag(raw.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Whether the value reads as enabled: `true` in any case, or `1`
    ///
    /// Matches how sqlx reads `SQLX_OFFLINE`, so preflight and the compiler
    /// agree on the mode.
    pub fn is_truthy(&self) -> bool {
        self.value == "1" || self.value.eq_ignore_ascii_case("true")
    }
}

/// The release compilation performed in the `Compile` stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStep {
    pub binary: String,
    pub flags: Vec<BuildFlag>,
    pub locked: bool,
}

impl CompileStep {
    /// Cargo invocation, exec form
    pub fn command(&self) -> Vec<String> {
        let mut command = vec![
            "cargo".to_string(),
            "build".to_string(),
            "--release".to_string(),
            "--bin".to_string(),
            self.binary.clone(),
        ];
        if self.locked {
            command.push("--locked".to_string());
        }
        command
    }

    /// Whether compile-time database checks read offline metadata
    pub fn offline(&self) -> bool {
        self.flags
            .iter()
            .any(|flag| flag.name == OFFLINE_FLAG && flag.is_truthy())
    }
}

/// The process the container runs when started without overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub path: String,
    pub args: Vec<String>,
}

impl EntryPoint {
    /// Exec-form vector as stored in the image configuration
    pub fn exec_form(&self) -> Vec<String> {
        let mut exec = vec![self.path.clone()];
        exec.extend(self.args.iter().cloned());
        exec
    }
}

/// Everything needed to render and run one image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub base: BaseImage,
    pub packages: Vec<String>,
    pub workdir: String,
    pub compile: CompileStep,
    pub entrypoint: EntryPoint,
}

impl Recipe {
    /// Assemble and validate a recipe from configuration
    pub fn from_config(config: &Config) -> Result<Self, RecipeError> {
        let base: BaseImage = config.base_image.parse()?;
        base.ensure_pinned(config.allow_floating_base)?;

        for package in &config.build_packages {
            let valid = package
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric())
                && package.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '+' | '-')
                });
            if !valid {
                return Err(RecipeError::InvalidPackage(package.clone()));
            }
        }

        if !config.workdir.starts_with('/') {
            return Err(RecipeError::RelativeWorkdir(config.workdir.clone()));
        }
        let workdir = match config.workdir.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };

        let binary = config.binary_name.trim();
        let valid_binary = !binary.is_empty()
            && binary
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !valid_binary {
            return Err(RecipeError::InvalidBinaryName(config.binary_name.clone()));
        }

        let flags = config
            .compile_flags
            .iter()
            .map(|raw| BuildFlag::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let compile = CompileStep {
            binary: binary.to_string(),
            flags,
            locked: config.locked,
        };
        let entrypoint = EntryPoint {
            path: binary_path(&workdir, binary),
            args: Vec::new(),
        };

        Ok(Self {
            base,
            packages: config.build_packages.clone(),
            workdir,
            compile,
            entrypoint,
        })
    }

    /// Build arguments handed to the daemon with the build request
    pub fn build_args(&self) -> HashMap<String, String> {
        self.compile
            .flags
            .iter()
            .map(|flag| (flag.name.clone(), flag.value.clone()))
            .collect()
    }
}

/// Absolute path of the release binary inside the build environment
fn binary_path(workdir: &str, binary: &str) -> String {
    let workdir = workdir.trim_end_matches('/');
    format!("{workdir}/target/release/{binary}")
}

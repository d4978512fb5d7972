//! Build failure taxonomy

use std::time::Duration;

use thiserror::Error;

use crate::docker::DockerError;
use crate::recipe::Stage;

/// Why a build produced no image
///
/// Every variant is fatal. A failed build never moves the final tag.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Invalid configuration, detected before any stage ran
    #[error("Configuration failure: {0}")]
    Configuration(String),

    /// Base toolchain image could not be fetched or resolved
    #[error("Environment resolution failure: {0}")]
    EnvironmentResolution(String),

    /// Package manager could not install the build tools
    #[error("Dependency installation failure: {0}")]
    DependencyInstallation(String),

    /// Source tree could not be selected, packed or copied
    #[error("Source materialization failure: {0}")]
    SourceMaterialization(String),

    /// The compiler reported an error
    #[error("Compilation failure: {0}")]
    Compilation(String),

    /// The entry point does not reference the compiled binary
    #[error("Entry-point binding failure: {0}")]
    EntryPointBinding(String),

    /// The overall build timeout elapsed
    #[error("Build timed out after {} during {stage}", humantime::format_duration(*.limit))]
    Timeout { stage: Stage, limit: Duration },

    /// The container engine itself failed
    #[error("Container engine failure during {stage}: {source}")]
    Engine {
        stage: Stage,
        #[source]
        source: DockerError,
    },
}

impl BuildError {
    /// The failure class of a stage that failed for a stage-specific reason
    pub fn for_stage(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            Stage::SelectBase => BuildError::EnvironmentResolution(message),
            Stage::InstallDeps => BuildError::DependencyInstallation(message),
            Stage::CopySource => BuildError::SourceMaterialization(message),
            Stage::SetConfig => BuildError::Configuration(message),
            Stage::Compile => BuildError::Compilation(message),
            Stage::BindEntry | Stage::Done | Stage::Failed => BuildError::EntryPointBinding(message),
        }
    }

    /// Stage the failure belongs to; `None` when no stage had started
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BuildError::Configuration(_) => None,
            BuildError::EnvironmentResolution(_) => Some(Stage::SelectBase),
            BuildError::DependencyInstallation(_) => Some(Stage::InstallDeps),
            BuildError::SourceMaterialization(_) => Some(Stage::CopySource),
            BuildError::Compilation(_) => Some(Stage::Compile),
            BuildError::EntryPointBinding(_) => Some(Stage::BindEntry),
            BuildError::Timeout { stage, .. } | BuildError::Engine { stage, .. } => Some(*stage),
        }
    }

    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Configuration(_) => 2,
            BuildError::EnvironmentResolution(_) => 3,
            BuildError::DependencyInstallation(_) => 4,
            BuildError::SourceMaterialization(_) => 5,
            BuildError::Compilation(_) => 6,
            BuildError::EntryPointBinding(_) => 7,
            BuildError::Timeout { .. } => 8,
            BuildError::Engine { .. } => 9,
        }
    }
}

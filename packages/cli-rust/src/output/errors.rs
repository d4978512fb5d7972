//! Error formatting with actionable guidance

use console::style;
use zer02prod_image_core::docker::DockerError;
use zer02prod_image_core::pipeline::BuildError;

/// Format Docker errors with actionable guidance
pub fn format_docker_error(e: &DockerError) -> String {
    match e {
        DockerError::NotRunning => format!(
            "{}\n\n  {}\n  {}",
            style("Docker is not running").red().bold(),
            "Start Docker Desktop or the Docker daemon:",
            style("  sudo systemctl start docker").cyan(),
        ),
        DockerError::PermissionDenied => format!(
            "{}\n\n  {}\n  {}\n  {}",
            style("Permission denied accessing Docker").red().bold(),
            "Add your user to the docker group:",
            style("  sudo usermod -aG docker $USER").cyan(),
            "Then log out and back in.",
        ),
        DockerError::Connection(msg) => format!(
            "{}\n\n  {}\n\n  {} Is DOCKER_HOST pointing at a running daemon?",
            style("Cannot connect to Docker").red().bold(),
            msg,
            style("Tip:").cyan(),
        ),
        DockerError::Timeout => format!(
            "{}\n\n  {}",
            style("The Docker daemon stopped responding").red().bold(),
            "The request exceeded the client timeout. Check 'docker info' and retry.",
        ),
        _ => e.to_string(),
    }
}

/// [`format_docker_error`] as an `anyhow` error
pub fn format_docker_error_anyhow(e: &DockerError) -> anyhow::Error {
    anyhow::anyhow!("{}", format_docker_error(e))
}

/// Format a build failure: class, stage, exit code, details
pub fn format_build_error(e: &BuildError) -> String {
    let stage = e
        .stage()
        .map(|s| format!(" during {}", style(s.label()).yellow()))
        .unwrap_or_default();
    let heading = format!(
        "{} {}{} {}",
        style("Build failed:").red().bold(),
        failure_class(e),
        stage,
        style(format!("(exit {})", e.exit_code())).dim()
    );

    let details = match e {
        BuildError::Engine { source, .. } => format_docker_error(source),
        BuildError::Timeout { .. } => format!(
            "{e}\n\n  {} Raise build_timeout_secs or pass --timeout.",
            style("Tip:").cyan()
        ),
        BuildError::Configuration(msg) => format!(
            "{msg}\n\n  {} Check z2p-image.jsonc in the source directory.",
            style("Tip:").cyan()
        ),
        other => detail_text(other),
    };

    let indented = details
        .lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{heading}\n\n{indented}")
}

fn failure_class(e: &BuildError) -> &'static str {
    match e {
        BuildError::Configuration(_) => "configuration",
        BuildError::EnvironmentResolution(_) => "environment resolution",
        BuildError::DependencyInstallation(_) => "dependency installation",
        BuildError::SourceMaterialization(_) => "source materialization",
        BuildError::Compilation(_) => "compilation",
        BuildError::EntryPointBinding(_) => "entry-point binding",
        BuildError::Timeout { .. } => "timeout",
        BuildError::Engine { .. } => "container engine",
    }
}

fn detail_text(e: &BuildError) -> String {
    match e {
        BuildError::EnvironmentResolution(msg)
        | BuildError::DependencyInstallation(msg)
        | BuildError::SourceMaterialization(msg)
        | BuildError::Compilation(msg)
        | BuildError::EntryPointBinding(msg)
        | BuildError::Configuration(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use zer02prod_image_core::recipe::Stage;

    #[test]
    fn build_error_names_class_stage_and_code() {
        let text = format_build_error(&BuildError::Compilation(
            "error[E0425]: cannot find value `x`".to_string(),
        ));
        assert!(text.contains("compilation"));
        assert!(text.contains("compile"));
        assert!(text.contains("exit 6"));
        assert!(text.contains("E0425"));
    }

    #[test]
    fn engine_error_carries_docker_guidance() {
        let text = format_build_error(&BuildError::Engine {
            stage: Stage::SelectBase,
            source: DockerError::NotRunning,
        });
        assert!(text.contains("Docker is not running"));
        assert!(text.contains("exit 9"));
    }

    #[test]
    fn timeout_suggests_raising_limit() {
        let text = format_build_error(&BuildError::Timeout {
            stage: Stage::Compile,
            limit: Duration::from_secs(1800),
        });
        assert!(text.contains("30m"));
        assert!(text.contains("--timeout"));
    }

    #[test]
    fn configuration_error_has_no_stage() {
        let text = format_build_error(&BuildError::Configuration("bad tag".to_string()));
        assert!(!text.contains("during"));
        assert!(text.contains("z2p-image.jsonc"));
    }
}

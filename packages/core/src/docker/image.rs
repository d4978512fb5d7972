//! Image pull, build, inspection, tagging and removal

use std::collections::{HashMap, HashSet, VecDeque};
use std::env;

use bollard::image::{
    BuildImageOptions, BuilderVersion, CreateImageOptions, RemoveImageOptions, TagImageOptions,
};
use bollard::models::BuildInfoAux;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, warn};

use super::progress::ProgressReporter;
use super::{DockerClient, DockerError};
use crate::recipe::BaseImage;

/// Default number of recent build log lines to capture for error context
const DEFAULT_BUILD_LOG_BUFFER_SIZE: usize = 20;

/// Default number of error lines to capture separately
const DEFAULT_ERROR_LOG_BUFFER_SIZE: usize = 10;

/// Everything the daemon needs for one build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Reference the result is tagged with
    pub tag: String,
    /// Dockerfile name inside the context archive
    pub dockerfile: String,
    /// Gzipped tar build context
    pub context: Vec<u8>,
    pub build_args: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub no_cache: bool,
}

/// The parts of an image configuration the pipeline checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    pub id: String,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
}

fn read_log_buffer_size(var_name: &str, default: usize) -> usize {
    let Ok(value) = env::var(var_name) else {
        return default;
    };
    let Ok(parsed) = value.trim().parse::<usize>() else {
        return default;
    };
    parsed.clamp(5, 500)
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error")
        || lower.contains("failed")
        || lower.contains("cannot")
        || lower.contains("unable to")
        || lower.contains("not found")
        || lower.contains("permission denied")
}

/// Parse `Step 6/8 : RUN ...` into `(6, 8)`
pub fn parse_step_line(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("Step ")?;
    let (counter, _) = rest.split_once(' ').unwrap_or((rest, ""));
    let (current, total) = counter.split_once('/')?;
    Some((current.parse().ok()?, total.parse().ok()?))
}

/// Split `name:tag` into its parts; a missing tag means `latest`
pub fn split_reference(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(colon) => {
            let colon = name_start + colon;
            (&reference[..colon], &reference[colon + 1..])
        }
        None => (reference, "latest"),
    }
}

/// Check if an image reference exists locally
pub async fn image_exists(client: &DockerClient, reference: &str) -> Result<bool, DockerError> {
    debug!("Checking if image exists: {}", reference);

    match client.inner().inspect_image(reference).await {
        Ok(_) => Ok(true),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(false),
        Err(e) => Err(DockerError::from(e)),
    }
}

/// Pull the base image once
///
/// A failed pull is not retried. If the daemon already holds the exact
/// pinned reference the build continues with the local copy.
pub async fn pull_base_image(
    client: &DockerClient,
    base: &BaseImage,
    progress: &mut ProgressReporter,
) -> Result<(), DockerError> {
    let reference = base.to_string();
    let (from_image, tag) = base.pull_args();

    match do_pull(client, &from_image, &tag, &reference, progress).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_engine_failure() => Err(e),
        Err(e) => {
            if image_exists(client, &reference).await? {
                warn!("Pull of {} failed ({}); using the local copy", reference, e);
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

async fn do_pull(
    client: &DockerClient,
    from_image: &str,
    tag: &str,
    reference: &str,
    progress: &mut ProgressReporter,
) -> Result<(), DockerError> {
    let options = CreateImageOptions {
        from_image,
        tag,
        ..Default::default()
    };

    let mut stream = client.inner().create_image(Some(options), None, None);

    progress.add_spinner("pull", &format!("Pulling {reference}..."));

    while let Some(result) = stream.next().await {
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                progress.abandon_all("Pull failed");
                return Err(match DockerError::from(e) {
                    DockerError::Connection(msg) => DockerError::Pull(msg),
                    other => other,
                });
            }
        };

        if let Some(error_msg) = info.error {
            progress.abandon_all(&error_msg);
            return Err(DockerError::Pull(format!("{reference}: {error_msg}")));
        }

        match (&info.id, info.status.as_deref()) {
            (Some(layer_id), Some(status @ ("Already exists" | "Pull complete"))) => {
                progress.finish(layer_id, status);
            }
            (Some(layer_id), Some(status @ ("Downloading" | "Extracting"))) => {
                if let Some(detail) = &info.progress_detail {
                    let current = detail.current.unwrap_or(0).max(0) as u64;
                    let total = detail.total.unwrap_or(0).max(0) as u64;
                    if total > 0 {
                        progress.update_layer(layer_id, current, total, status);
                    }
                }
            }
            (Some(layer_id), Some(status)) => progress.update_spinner(layer_id, status),
            (None, Some(status)) => progress.update_spinner("pull", status),
            _ => {}
        }
    }

    progress.finish("pull", &format!("Pulled {reference}"));
    Ok(())
}

/// Build an image and return its id
///
/// Uses the classic builder so the daemon reports `Step N/M` for every
/// Dockerfile instruction; `on_step` receives `N` as soon as it starts.
pub async fn build_image(
    client: &DockerClient,
    request: BuildRequest,
    progress: &mut ProgressReporter,
    on_step: &mut dyn FnMut(usize),
) -> Result<String, DockerError> {
    debug!(
        "Building image: {} (no_cache: {}, context: {} bytes)",
        request.tag,
        request.no_cache,
        request.context.len()
    );

    let options = BuildImageOptions {
        t: request.tag.clone(),
        dockerfile: request.dockerfile.clone(),
        buildargs: request.build_args.clone(),
        labels: request.labels.clone(),
        version: BuilderVersion::BuilderV1,
        rm: true,
        forcerm: true,
        nocache: request.no_cache,
        ..Default::default()
    };

    let body = Bytes::from(request.context);
    let mut stream = client.inner().build_image(options, None, Some(body));

    progress.add_spinner("build", "Sending build context...");

    let build_log_buffer_size =
        read_log_buffer_size("Z2P_BUILD_LOG_TAIL", DEFAULT_BUILD_LOG_BUFFER_SIZE);
    let error_log_buffer_size =
        read_log_buffer_size("Z2P_BUILD_ERROR_TAIL", DEFAULT_ERROR_LOG_BUFFER_SIZE);
    let mut recent_logs: VecDeque<String> = VecDeque::with_capacity(build_log_buffer_size);
    let mut error_logs: VecDeque<String> = VecDeque::with_capacity(error_log_buffer_size);
    let mut current_step = None;
    let mut maybe_image_id = None;

    while let Some(result) = stream.next().await {
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                progress.abandon_all("Build failed");
                let err = DockerError::from(e);
                if err.is_engine_failure() || matches!(err, DockerError::Timeout) {
                    return Err(err);
                }
                return Err(DockerError::Build {
                    step: current_step,
                    message: format_build_error_with_context(
                        &err.to_string(),
                        &recent_logs,
                        &error_logs,
                    ),
                });
            }
        };

        if let Some(stream_msg) = info.stream {
            for line in stream_msg.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if let Some((step, _total)) = parse_step_line(line) {
                    debug!("Build step: {}", line);
                    current_step = Some(step);
                    on_step(step);
                }
                progress.update_spinner("build", line);

                if recent_logs.len() >= build_log_buffer_size {
                    recent_logs.pop_front();
                }
                recent_logs.push_back(line.to_string());

                if is_error_line(line) {
                    if error_logs.len() >= error_log_buffer_size {
                        error_logs.pop_front();
                    }
                    error_logs.push_back(line.to_string());
                }
            }
        }

        if let Some(error_msg) = info.error {
            progress.abandon_all(&error_msg);
            return Err(DockerError::Build {
                step: current_step,
                message: format_build_error_with_context(&error_msg, &recent_logs, &error_logs),
            });
        }

        if let Some(BuildInfoAux::Default(image_id)) = info.aux {
            if let Some(id) = image_id.id {
                maybe_image_id = Some(id);
            }
        }
    }

    let image_id = match maybe_image_id {
        Some(id) => id,
        None => inspect_image_config(client, &request.tag)
            .await?
            .map(|config| config.id)
            .ok_or_else(|| DockerError::Build {
                step: current_step,
                message: format!("Build finished but {} does not exist", request.tag),
            })?,
    };

    progress.finish("build", &format!("Built {image_id}"));
    Ok(image_id)
}

/// Inspect an image; `None` when the daemon does not know the reference
pub async fn inspect_image_config(
    client: &DockerClient,
    reference: &str,
) -> Result<Option<ImageConfig>, DockerError> {
    let inspect = match client.inner().inspect_image(reference).await {
        Ok(inspect) => inspect,
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => return Ok(None),
        Err(e) => return Err(DockerError::from(e)),
    };

    let config = inspect.config.unwrap_or_default();
    Ok(Some(ImageConfig {
        id: inspect.id.unwrap_or_default(),
        entrypoint: config.entrypoint.unwrap_or_default(),
        cmd: config.cmd.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
    }))
}

/// Point `repo:tag` at the image named by `source`
pub async fn tag_image(
    client: &DockerClient,
    source: &str,
    repo: &str,
    tag: &str,
) -> Result<(), DockerError> {
    debug!("Tagging {} as {}:{}", source, repo, tag);
    let options = TagImageOptions { repo, tag };
    client
        .inner()
        .tag_image(source, Some(options))
        .await
        .map_err(|e| DockerError::Image(format!("Failed to tag {source} as {repo}:{tag}: {e}")))
}

/// Remove an image reference; a missing reference is not an error
pub async fn remove_image(
    client: &DockerClient,
    reference: &str,
    force: bool,
) -> Result<(), DockerError> {
    debug!("Removing image {} (force={})", reference, force);
    let options = RemoveImageOptions {
        force,
        noprune: false,
    };
    match client
        .inner()
        .remove_image(reference, Some(options), None)
        .await
    {
        Ok(_) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(e) => Err(DockerError::Image(format!(
            "Failed to remove {reference}: {e}"
        ))),
    }
}

/// Append recent output and a hint to a build error
pub fn format_build_error_with_context(
    error: &str,
    recent_logs: &VecDeque<String>,
    error_logs: &VecDeque<String>,
) -> String {
    let mut message = String::from(error);

    let recent_set: HashSet<&String> = recent_logs.iter().collect();
    let unique_errors: Vec<&String> = error_logs
        .iter()
        .filter(|line| !recent_set.contains(line))
        .collect();
    if !unique_errors.is_empty() {
        message.push_str("\n\nPotential errors detected during build:");
        for line in unique_errors {
            message.push_str("\n  ");
            message.push_str(line);
        }
    }

    if recent_logs.is_empty() {
        message.push_str("\n\nNo build output was received from the Docker daemon.");
    } else {
        message.push_str("\n\nRecent build output:");
        for line in recent_logs {
            message.push_str("\n  ");
            message.push_str(line);
        }
    }

    let error_lower = error.to_lowercase();
    let all_output = recent_logs
        .iter()
        .chain(error_logs.iter())
        .map(|l| l.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    if all_output.contains("sqlx_offline") || all_output.contains("database_url") {
        message.push_str("\n\nSuggestion: Query metadata is missing or stale. Run 'cargo sqlx prepare' and commit the .sqlx directory.");
    } else if all_output.contains("linker") && all_output.contains("not found") {
        message.push_str("\n\nSuggestion: The linker is missing. Check build_packages (lld, clang).");
    } else if error_lower.contains("network")
        || error_lower.contains("connection")
        || error_lower.contains("timeout")
    {
        message.push_str("\n\nSuggestion: Check your network connection and Docker's ability to reach the internet.");
    } else if error_lower.contains("no space") || error_lower.contains("disk") {
        message.push_str("\n\nSuggestion: Free up disk space with 'docker system prune' or check available storage.");
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_step_line_reads_counters() {
        assert_eq!(parse_step_line("Step 1/8 : FROM rust:1.83.0"), Some((1, 8)));
        assert_eq!(parse_step_line("Step 6/8 : RUN [\"cargo\"]"), Some((6, 8)));
        assert_eq!(parse_step_line("Step 12/12"), Some((12, 12)));
        assert_eq!(parse_step_line(" ---> Running in 3f2a"), None);
        assert_eq!(parse_step_line("Step x/8 : FROM"), None);
    }

    #[test]
    fn split_reference_handles_registries_and_missing_tags() {
        assert_eq!(split_reference("zer02prod:local"), ("zer02prod", "local"));
        assert_eq!(
            split_reference("localhost:5000/zer02prod:v1"),
            ("localhost:5000/zer02prod", "v1")
        );
        assert_eq!(
            split_reference("localhost:5000/zer02prod"),
            ("localhost:5000/zer02prod", "latest")
        );
        assert_eq!(split_reference("zer02prod"), ("zer02prod", "latest"));
    }

    #[test]
    fn format_build_error_includes_recent_logs() {
        let mut logs = VecDeque::new();
        logs.push_back("Step 5/8 : ARG SQLX_OFFLINE=true".to_string());
        logs.push_back("Step 6/8 : RUN [\"cargo\",\"build\"]".to_string());
        logs.push_back("   Compiling zer02prod v0.1.0 (/app)".to_string());
        let error_logs = VecDeque::new();

        let result = format_build_error_with_context(
            "The command '[\"cargo\"]' returned a non-zero code: 101",
            &logs,
            &error_logs,
        );

        assert!(result.contains("non-zero code: 101"));
        assert!(result.contains("Recent build output:"));
        assert!(result.contains("Compiling zer02prod"));
    }

    #[test]
    fn format_build_error_handles_empty_logs() {
        let result =
            format_build_error_with_context("Stream error", &VecDeque::new(), &VecDeque::new());
        assert!(result.contains("Stream error"));
        assert!(!result.contains("Recent build output:"));
        assert!(result.contains("No build output"));
    }

    #[test]
    fn format_build_error_shows_scrolled_off_errors() {
        let mut recent_logs = VecDeque::new();
        recent_logs.push_back("   Compiling tokio v1.43.0".to_string());

        let mut error_logs = VecDeque::new();
        error_logs.push_back("error[E0425]: cannot find value `pool` in this scope".to_string());

        let result = format_build_error_with_context("Build failed", &recent_logs, &error_logs);
        assert!(result.contains("Potential errors detected during build:"));
        assert!(result.contains("E0425"));
    }

    #[test]
    fn format_build_error_suggests_preparing_query_metadata() {
        let mut error_logs = VecDeque::new();
        error_logs.push_back(
            "error: `SQLX_OFFLINE=true` but there is no cached data for this query".to_string(),
        );
        let result = format_build_error_with_context("Build failed", &error_logs, &error_logs);
        assert!(result.contains("cargo sqlx prepare"));
    }

    #[test]
    fn format_build_error_suggests_linker_packages() {
        let mut logs = VecDeque::new();
        logs.push_back("error: linker `clang` not found".to_string());
        let result = format_build_error_with_context("Build failed", &logs, &VecDeque::new());
        assert!(result.contains("build_packages"));
    }

    #[test]
    fn format_build_error_adds_network_suggestion() {
        let result = format_build_error_with_context(
            "connection reset by peer",
            &VecDeque::new(),
            &VecDeque::new(),
        );
        assert!(result.contains("Check your network connection"));
    }

    #[test]
    fn is_error_line_detects_errors() {
        assert!(is_error_line("error: could not compile `zer02prod`"));
        assert!(is_error_line("E: Unable to locate package lld"));
        assert!(is_error_line("failed to run custom build command"));
        assert!(!is_error_line("   Compiling serde v1.0.217"));
        assert!(!is_error_line("Successfully built 4f1c"));
    }
}

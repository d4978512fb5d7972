//! Staged image build pipeline
//!
//! Runs the recipe through `SelectBase → InstallDeps → CopySource →
//! SetConfig → Compile → BindEntry → Done`. The daemon builds under a
//! candidate reference; the final reference only moves once the built
//! image's entry point has been checked. Any failure ends in `Failed`,
//! removes the candidate and leaves the final reference untouched.

mod engine;
mod error;
mod preflight;
mod record;
mod reproduce;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::context::{IgnoreManifest, build_context_archive, collect_source_tree};
use crate::docker::{
    self, BuildRequest, DockerError, LABEL_FINGERPRINT, LABEL_SOURCE_DIGEST, split_reference,
};
use crate::recipe::{
    BaseImage, DOCKERFILE_NAME, PipelineState, Recipe, RenderedDockerfile, Stage, StageTiming, render,
};

pub use engine::{DockerEngine, ImageEngine};
pub use error::BuildError;
pub use preflight::{OFFLINE_METADATA_PATHS, PreflightReport, run_preflight};
pub use record::{BuildRecord, load_record, record_path, save_record};
pub use reproduce::{ReproducibilityReport, check_reproducibility};

/// Everything a pipeline run needs, resolved from configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source_root: PathBuf,
    pub recipe: Recipe,
    pub manifest: IgnoreManifest,
    pub image_name: String,
    pub image_tag: String,
    pub timeout: Duration,
    pub no_cache: bool,
    /// Where build records are kept; `None` disables records and the
    /// unchanged-build skip
    pub records_dir: Option<PathBuf>,
}

impl PipelineOptions {
    /// Resolve options for `source_root`, failing with a configuration error
    pub fn from_config(config: &Config, source_root: &Path) -> Result<Self, BuildError> {
        config::schema::validate_image_name(&config.image_name)
            .map_err(BuildError::Configuration)?;
        config::schema::validate_image_tag(&config.image_tag)
            .map_err(BuildError::Configuration)?;
        if config.build_timeout_secs == 0 {
            return Err(BuildError::Configuration(
                "build_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let recipe =
            Recipe::from_config(config).map_err(|e| BuildError::Configuration(e.to_string()))?;
        let manifest = IgnoreManifest::load(source_root, &config.include, &config.exclude)
            .map_err(|e| BuildError::Configuration(e.to_string()))?;

        Ok(Self {
            source_root: source_root.to_path_buf(),
            recipe,
            manifest,
            image_name: config.image_name.clone(),
            image_tag: config.image_tag.clone(),
            timeout: Duration::from_secs(config.build_timeout_secs),
            no_cache: config.no_cache,
            records_dir: config::get_records_dir(),
        })
    }

    /// Final reference, `name:tag`
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub image: String,
    pub image_id: String,
    pub fingerprint: String,
    pub source_digest: String,
    /// Entry point bound in the image, exec form
    pub entrypoint: Vec<String>,
    pub timings: Vec<StageTiming>,
    /// The previous build was reused without contacting the builder
    pub cached: bool,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// SHA-256 over everything that determines the build output
///
/// `base_id` is the resolved image id of a base referenced by tag; a base
/// pinned by digest is already fixed by the Dockerfile text.
pub fn fingerprint(
    dockerfile: &str,
    build_args: &HashMap<String, String>,
    source_digest: &str,
    base_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"dockerfile\0");
    hasher.update(dockerfile.as_bytes());
    if let Some(id) = base_id {
        hasher.update(b"\0base\0");
        hasher.update(id.as_bytes());
    }
    hasher.update(b"\0args\0");
    let sorted: BTreeMap<_, _> = build_args.iter().collect();
    for (name, value) in sorted {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"source\0");
    hasher.update(source_digest.as_bytes());
    hex::encode(hasher.finalize())
}

/// One build of one recipe
pub struct Pipeline<E: ImageEngine> {
    engine: E,
    options: PipelineOptions,
    state: PipelineState,
    candidate: Option<String>,
    on_stage: Option<Box<dyn FnMut(Stage)>>,
}

impl<E: ImageEngine> Pipeline<E> {
    pub fn new(engine: E, options: PipelineOptions) -> Self {
        Self {
            engine,
            options,
            state: PipelineState::new(),
            candidate: None,
            on_stage: None,
        }
    }

    /// Call `callback` whenever the build enters a new stage
    pub fn on_stage(mut self, callback: impl FnMut(Stage) + 'static) -> Self {
        self.on_stage = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn engine(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Run the whole build under the configured timeout
    pub async fn run(&mut self) -> Result<BuildReport, BuildError> {
        let limit = self.options.timeout;
        let outcome = tokio::time::timeout(limit, self.execute()).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(BuildError::Timeout {
                stage: self.state.current(),
                limit,
            }),
        };

        if let Err(err) = &result {
            let failed_in = self.state.fail();
            warn!("Build failed during {}: {}", failed_in, err);
            self.discard_candidate().await;
        }
        result
    }

    async fn execute(&mut self) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let reference = self.options.image_reference();
        self.notify(Stage::SelectBase);

        let tree = collect_source_tree(&self.options.source_root, &self.options.manifest)
            .map_err(|e| BuildError::SourceMaterialization(e.to_string()))?;
        let preflight = run_preflight(
            &self.options.source_root,
            &self.options.recipe,
            &tree,
        )?;
        let source_digest = tree
            .digest()
            .map_err(|e| BuildError::SourceMaterialization(e.to_string()))?;

        // SelectBase: a tag can be re-pushed upstream, so what it resolves to
        // now is an input of the build
        let base = self.options.recipe.base.clone();
        let base_id = if base.digest().is_some() {
            None
        } else {
            self.pull_base(&base).await?;
            self.engine
                .inspect(&base.to_string())
                .await
                .map_err(|e| self.classify(e))?
                .map(|config| config.id)
        };

        let rendered = render(&self.options.recipe);
        let dockerfile = rendered.text();
        let build_args = self.options.recipe.build_args();
        let fingerprint = fingerprint(&dockerfile, &build_args, &source_digest, base_id.as_deref());
        debug!("Fingerprint for {}: {}", reference, fingerprint);

        if let Some(record) = self.reusable_record(&reference, &fingerprint).await? {
            info!("{} is up to date ({})", reference, record.image_id);
            self.advance(Stage::Done)?;
            return Ok(BuildReport {
                image: reference,
                image_id: record.image_id,
                fingerprint,
                source_digest,
                entrypoint: self.options.recipe.entrypoint.exec_form(),
                timings: self.state.timings().to_vec(),
                cached: true,
                warnings: preflight.warnings,
                elapsed: started.elapsed(),
            });
        }

        if base.digest().is_some() {
            self.pull_base(&base).await?;
        }

        let context = build_context_archive(&tree, &dockerfile)
            .map_err(|e| BuildError::SourceMaterialization(e.to_string()))?;

        // InstallDeps through BindEntry run inside the daemon
        let candidate = format!(
            "{}:{}-candidate-{}",
            self.options.image_name,
            self.options.image_tag,
            docker::session_id()
        );
        self.candidate = Some(candidate.clone());

        let request = BuildRequest {
            tag: candidate.clone(),
            dockerfile: DOCKERFILE_NAME.to_string(),
            context,
            build_args,
            labels: HashMap::from([
                (LABEL_FINGERPRINT.to_string(), fingerprint.clone()),
                (LABEL_SOURCE_DIGEST.to_string(), source_digest.clone()),
            ]),
            no_cache: self.options.no_cache,
        };

        let built = {
            let state = &mut self.state;
            let on_stage = &mut self.on_stage;
            self.engine
                .build(request, &mut |step| {
                    track_step(&rendered, state, on_stage, step);
                })
                .await
        };
        let image_id = built.map_err(|e| self.classify(e))?;

        // BindEntry: the image must run the binary directly
        self.advance(Stage::BindEntry)?;
        let expected = self.options.recipe.entrypoint.exec_form();
        let config = self
            .engine
            .inspect(&candidate)
            .await
            .map_err(|e| self.classify(e))?
            .ok_or_else(|| {
                BuildError::EntryPointBinding(format!("Built image {candidate} is missing"))
            })?;
        if config.entrypoint != expected {
            return Err(BuildError::EntryPointBinding(format!(
                "Image entry point is {:?}, expected {:?}",
                config.entrypoint, expected
            )));
        }
        if !config.cmd.is_empty() {
            return Err(BuildError::EntryPointBinding(format!(
                "Image declares default arguments {:?}; the binary must start without any",
                config.cmd
            )));
        }

        let (repo, tag) = split_reference(&reference);
        self.engine
            .tag(&candidate, repo, tag)
            .await
            .map_err(|e| self.classify(e))?;
        self.candidate = None;
        if let Err(e) = self.engine.remove(&candidate, false).await {
            warn!("Could not remove candidate tag {}: {}", candidate, e);
        }
        self.advance(Stage::Done)?;

        let elapsed = started.elapsed();
        let report = BuildReport {
            image: reference,
            image_id,
            fingerprint,
            source_digest,
            entrypoint: expected,
            timings: self.state.timings().to_vec(),
            cached: false,
            warnings: preflight.warnings,
            elapsed,
        };
        self.write_record(&report);
        Ok(report)
    }

    async fn pull_base(&mut self, base: &BaseImage) -> Result<(), BuildError> {
        self.engine
            .pull_base(base)
            .await
            .map_err(|e| self.classify(e))
    }

    /// The previous build of this reference, if it is still exactly current
    async fn reusable_record(
        &mut self,
        reference: &str,
        fingerprint: &str,
    ) -> Result<Option<BuildRecord>, BuildError> {
        if self.options.no_cache {
            return Ok(None);
        }
        let Some(dir) = &self.options.records_dir else {
            return Ok(None);
        };
        let Some(record) = load_record(dir, reference) else {
            return Ok(None);
        };
        if record.fingerprint != fingerprint || record.image != reference {
            debug!("Inputs changed since the last build of {}", reference);
            return Ok(None);
        }

        let current = self
            .engine
            .inspect(reference)
            .await
            .map_err(|e| self.classify(e))?;
        match current {
            Some(config) if config.id == record.image_id => Ok(Some(record)),
            _ => {
                debug!("{} no longer points at {}", reference, record.image_id);
                Ok(None)
            }
        }
    }

    fn write_record(&self, report: &BuildReport) {
        let Some(dir) = &self.options.records_dir else {
            return;
        };
        let record = BuildRecord {
            image: report.image.clone(),
            image_id: report.image_id.clone(),
            fingerprint: report.fingerprint.clone(),
            source_digest: report.source_digest.clone(),
            built_at: Utc::now(),
            duration_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        if let Err(e) = save_record(dir, &record) {
            warn!("Could not save build record: {:#}", e);
        }
    }

    /// Remove the candidate reference of a failed build
    async fn discard_candidate(&mut self) {
        if let Some(candidate) = self.candidate.take() {
            debug!("Removing candidate {}", candidate);
            if let Err(e) = self.engine.remove(&candidate, true).await {
                warn!("Could not remove candidate {}: {}", candidate, e);
            }
        }
    }

    fn advance(&mut self, target: Stage) -> Result<(), BuildError> {
        let before = self.state.current();
        self.state
            .advance_to(target)
            .map_err(|e| BuildError::for_stage(before, e.to_string()))?;
        if before != target {
            self.notify(target);
        }
        Ok(())
    }

    fn notify(&mut self, stage: Stage) {
        if let Some(callback) = self.on_stage.as_mut() {
            callback(stage);
        }
    }

    /// Attribute an engine error to the stage the build is in
    fn classify(&self, err: DockerError) -> BuildError {
        let stage = self.state.current();
        match err {
            err if err.is_engine_failure() => BuildError::Engine { stage, source: err },
            DockerError::Timeout => BuildError::Engine {
                stage,
                source: DockerError::Timeout,
            },
            DockerError::Pull(message) => BuildError::EnvironmentResolution(message),
            // The daemon rejected the request before running any instruction
            DockerError::Build {
                step: None,
                message,
            } => BuildError::SourceMaterialization(message),
            DockerError::Build { message, .. } => BuildError::for_stage(stage, message),
            other => BuildError::for_stage(stage, other.to_string()),
        }
    }
}

/// Move the state machine to the stage of a reported build step
fn track_step(
    rendered: &RenderedDockerfile,
    state: &mut PipelineState,
    on_stage: &mut Option<Box<dyn FnMut(Stage)>>,
    step: usize,
) {
    let Some(stage) = rendered.stage_for_step(step) else {
        debug!("Step {} is outside the rendered Dockerfile", step);
        return;
    };
    let before = state.current();
    if stage <= before {
        return;
    }
    match state.advance_to(stage) {
        Ok(()) => {
            if let Some(callback) = on_stage.as_mut() {
                callback(stage);
            }
        }
        Err(e) => debug!("Ignoring step {}: {}", step, e),
    }
}

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tempfile::TempDir;

use super::*;
use crate::docker::ImageConfig;
use crate::recipe::BaseImage;

const BINARY: &str = "/app/target/release/zer02prod";

/// In-memory engine that walks the rendered steps like the daemon would
struct FakeEngine {
    steps: usize,
    images: HashMap<String, ImageConfig>,
    calls: Vec<String>,
    engine_down: bool,
    fail_pull: bool,
    fail_at_step: Option<usize>,
    sleep_at_step: Option<(usize, Duration)>,
    entrypoint: Vec<String>,
    cmd: Vec<String>,
    digests: VecDeque<String>,
    last_request: Option<BuildRequest>,
    built: usize,
    /// Image id the next pull resolves the base reference to
    base_id: String,
    pulled: HashMap<String, String>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            steps: 8,
            images: HashMap::new(),
            calls: Vec::new(),
            engine_down: false,
            fail_pull: false,
            fail_at_step: None,
            sleep_at_step: None,
            entrypoint: vec![BINARY.to_string()],
            cmd: Vec::new(),
            digests: VecDeque::new(),
            last_request: None,
            built: 0,
            base_id: "sha256:base-1".to_string(),
            pulled: HashMap::new(),
        }
    }

    fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(call)).count()
    }

    fn has_candidate(&self) -> bool {
        self.images.keys().any(|reference| reference.contains("-candidate-"))
    }
}

impl ImageEngine for FakeEngine {
    async fn pull_base(&mut self, base: &BaseImage) -> Result<(), DockerError> {
        self.calls.push(format!("pull {base}"));
        if self.engine_down {
            return Err(DockerError::NotRunning);
        }
        if self.fail_pull {
            return Err(DockerError::Pull(format!("manifest for {base} not found")));
        }
        self.pulled.insert(base.to_string(), self.base_id.clone());
        Ok(())
    }

    async fn build(
        &mut self,
        request: BuildRequest,
        on_step: &mut dyn FnMut(usize),
    ) -> Result<String, DockerError> {
        self.calls.push(format!("build {}", request.tag));
        self.last_request = Some(request.clone());

        for step in 1..=self.steps {
            on_step(step);
            if let Some((at, duration)) = self.sleep_at_step {
                if at == step {
                    tokio::time::sleep(duration).await;
                }
            }
            if self.fail_at_step == Some(step) {
                return Err(DockerError::Build {
                    step: Some(step),
                    message: format!("step {step} exited with code 101"),
                });
            }
        }

        self.built += 1;
        let id = format!("sha256:{:064x}", self.built);
        self.images.insert(
            request.tag.clone(),
            ImageConfig {
                id: id.clone(),
                entrypoint: self.entrypoint.clone(),
                cmd: self.cmd.clone(),
                labels: request.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn inspect(&mut self, reference: &str) -> Result<Option<ImageConfig>, DockerError> {
        self.calls.push(format!("inspect {reference}"));
        if let Some(config) = self.images.get(reference) {
            return Ok(Some(config.clone()));
        }
        Ok(self.pulled.get(reference).map(|id| ImageConfig {
            id: id.clone(),
            entrypoint: Vec::new(),
            cmd: Vec::new(),
            labels: HashMap::new(),
        }))
    }

    async fn tag(&mut self, source: &str, repo: &str, tag: &str) -> Result<(), DockerError> {
        self.calls.push(format!("tag {source} {repo}:{tag}"));
        let config = self
            .images
            .get(source)
            .cloned()
            .ok_or_else(|| DockerError::Image(format!("No such image: {source}")))?;
        self.images.insert(format!("{repo}:{tag}"), config);
        Ok(())
    }

    async fn remove(&mut self, reference: &str, force: bool) -> Result<(), DockerError> {
        self.calls.push(format!("remove {reference} force={force}"));
        self.images.remove(reference);
        Ok(())
    }

    async fn file_digest(&mut self, image: &str, path: &str) -> Result<String, DockerError> {
        self.calls.push(format!("digest {image} {path}"));
        Ok(self
            .digests
            .pop_front()
            .unwrap_or_else(|| "e".repeat(64)))
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Cargo.toml",
        "[package]\nname = \"zer02prod\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    );
    write(dir.path(), "Cargo.lock", "version = 3\n");
    write(dir.path(), "src/main.rs", "fn main() {}\n");
    write(dir.path(), ".sqlx/query-1.json", "{}");
    dir
}

fn options(source: &TempDir, records: &TempDir) -> PipelineOptions {
    let mut options = PipelineOptions::from_config(&Config::default(), source.path()).unwrap();
    options.records_dir = Some(records.path().to_path_buf());
    options
}

#[tokio::test]
async fn successful_build_moves_final_tag() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(FakeEngine::new(), options(&source, &records));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.image, "zer02prod:local");
    assert_eq!(report.entrypoint, vec![BINARY.to_string()]);
    assert!(!report.cached);
    assert_eq!(pipeline.state().current(), Stage::Done);
    assert_eq!(pipeline.state().timings().len(), Stage::SEQUENCE.len());

    let engine = pipeline.engine();
    assert!(!engine.has_candidate());
    let image = &engine.images["zer02prod:local"];
    assert_eq!(image.id, report.image_id);
    assert_eq!(image.labels[LABEL_FINGERPRINT], report.fingerprint);
    assert_eq!(image.labels[LABEL_SOURCE_DIGEST], report.source_digest);

    let request = engine.last_request.as_ref().unwrap();
    assert_eq!(request.dockerfile, DOCKERFILE_NAME);
    assert!(request.tag.starts_with("zer02prod:local-candidate-"));
    assert_eq!(request.build_args["SQLX_OFFLINE"], "true");
    assert!(!request.context.is_empty());

    let record = load_record(records.path(), "zer02prod:local").unwrap();
    assert_eq!(record.image_id, report.image_id);
    assert_eq!(record.fingerprint, report.fingerprint);
}

#[tokio::test]
async fn compile_error_leaves_no_image() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.fail_at_step = Some(6);
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::Compilation(_)), "{err:?}");
    assert_eq!(err.exit_code(), 6);
    assert_eq!(pipeline.state().current(), Stage::Failed);

    let engine = pipeline.engine();
    assert!(engine.images.is_empty());
    assert_eq!(engine.count("tag"), 0);
    assert!(load_record(records.path(), "zer02prod:local").is_none());
}

#[tokio::test]
async fn package_install_failure_is_classified() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.fail_at_step = Some(2);
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::DependencyInstallation(_)), "{err:?}");
    assert_eq!(err.stage(), Some(Stage::InstallDeps));
}

#[tokio::test]
async fn unresolvable_base_is_environment_failure() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.fail_pull = true;
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::EnvironmentResolution(_)), "{err:?}");
    assert_eq!(err.exit_code(), 3);
    assert_eq!(pipeline.engine().count("build"), 0);
}

#[tokio::test]
async fn unreachable_daemon_is_engine_failure() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.engine_down = true;
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(
        matches!(
            err,
            BuildError::Engine {
                stage: Stage::SelectBase,
                source: DockerError::NotRunning
            }
        ),
        "{err:?}"
    );
    assert_eq!(err.exit_code(), 9);
}

#[tokio::test]
async fn wrapped_entrypoint_is_rejected() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.entrypoint = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        BINARY.to_string(),
    ];
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::EntryPointBinding(_)), "{err:?}");
    assert_eq!(err.exit_code(), 7);

    let engine = pipeline.engine();
    assert!(!engine.has_candidate());
    assert!(!engine.images.contains_key("zer02prod:local"));
    assert!(engine.calls.iter().any(|c| c.contains("-candidate-") && c.ends_with("force=true")));
}

#[tokio::test]
async fn default_arguments_are_rejected() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.cmd = vec!["--help".to_string()];
    let mut pipeline = Pipeline::new(engine, options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::EntryPointBinding(_)), "{err:?}");
    assert!(!pipeline.engine().images.contains_key("zer02prod:local"));
}

#[tokio::test]
async fn unchanged_rebuild_is_skipped() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let mut first = Pipeline::new(FakeEngine::new(), options(&source, &records));
    let built = first.run().await.unwrap();

    let mut second = Pipeline::new(first.into_engine(), options(&source, &records));
    let reused = second.run().await.unwrap();

    assert!(reused.cached);
    assert_eq!(reused.image_id, built.image_id);
    assert_eq!(reused.fingerprint, built.fingerprint);
    assert_eq!(second.state().current(), Stage::Done);
    let engine = second.engine();
    assert_eq!(engine.count("build"), 1);
    assert_eq!(engine.count("pull"), 2);
}

#[tokio::test]
async fn moved_base_tag_triggers_rebuild() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let mut first = Pipeline::new(FakeEngine::new(), options(&source, &records));
    let built = first.run().await.unwrap();

    let mut engine = first.into_engine();
    engine.base_id = "sha256:base-2".to_string();
    let mut second = Pipeline::new(engine, options(&source, &records));
    let rebuilt = second.run().await.unwrap();

    assert!(!rebuilt.cached);
    assert_ne!(rebuilt.fingerprint, built.fingerprint);
    assert_eq!(rebuilt.source_digest, built.source_digest);
    assert_eq!(second.engine().count("build"), 2);
}

#[tokio::test]
async fn digest_pinned_base_is_reused_without_pulling() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let config = Config {
        base_image: format!("rust@sha256:{}", "a".repeat(64)),
        ..Config::default()
    };
    let options = || {
        let mut options = PipelineOptions::from_config(&config, source.path()).unwrap();
        options.records_dir = Some(records.path().to_path_buf());
        options
    };

    let mut first = Pipeline::new(FakeEngine::new(), options());
    first.run().await.unwrap();

    let mut second = Pipeline::new(first.into_engine(), options());
    assert!(second.run().await.unwrap().cached);
    let engine = second.engine();
    assert_eq!(engine.count("pull"), 1);
    assert_eq!(engine.count("build"), 1);
}

#[tokio::test]
async fn source_change_triggers_rebuild() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let mut first = Pipeline::new(FakeEngine::new(), options(&source, &records));
    let built = first.run().await.unwrap();

    write(source.path(), "src/main.rs", "fn main() { println!(\"hi\"); }\n");
    let mut second = Pipeline::new(first.into_engine(), options(&source, &records));
    let rebuilt = second.run().await.unwrap();

    assert!(!rebuilt.cached);
    assert_ne!(rebuilt.source_digest, built.source_digest);
    assert_ne!(rebuilt.image_id, built.image_id);
    assert_eq!(second.engine().count("build"), 2);
}

#[tokio::test]
async fn retagged_image_is_not_reused() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let mut first = Pipeline::new(FakeEngine::new(), options(&source, &records));
    first.run().await.unwrap();

    let mut engine = first.into_engine();
    engine.images.get_mut("zer02prod:local").unwrap().id = "sha256:other".to_string();
    let mut second = Pipeline::new(engine, options(&source, &records));
    assert!(!second.run().await.unwrap().cached);
}

#[tokio::test]
async fn no_cache_ignores_previous_build() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let mut first = Pipeline::new(FakeEngine::new(), options(&source, &records));
    first.run().await.unwrap();

    let mut opts = options(&source, &records);
    opts.no_cache = true;
    let mut second = Pipeline::new(first.into_engine(), opts);
    let report = second.run().await.unwrap();

    assert!(!report.cached);
    let engine = second.engine();
    assert_eq!(engine.count("build"), 2);
    assert!(engine.last_request.as_ref().unwrap().no_cache);
}

#[tokio::test(start_paused = true)]
async fn timeout_discards_candidate() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new();
    engine.sleep_at_step = Some((6, Duration::from_secs(600)));
    let mut opts = options(&source, &records);
    opts.timeout = Duration::from_secs(60);
    let mut pipeline = Pipeline::new(engine, opts);

    let err = pipeline.run().await.unwrap_err();
    assert!(
        matches!(
            err,
            BuildError::Timeout {
                stage: Stage::Compile,
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(err.exit_code(), 8);
    assert_eq!(pipeline.state().current(), Stage::Failed);

    let engine = pipeline.engine();
    assert!(!engine.images.contains_key("zer02prod:local"));
    assert!(engine.calls.iter().any(|c| c.starts_with("remove") && c.contains("-candidate-")));
}

#[tokio::test]
async fn preflight_failure_never_reaches_engine() {
    let source = project();
    std::fs::remove_dir_all(source.path().join(".sqlx")).unwrap();
    let records = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(FakeEngine::new(), options(&source, &records));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, BuildError::Configuration(_)), "{err:?}");
    assert_eq!(err.exit_code(), 2);
    assert!(pipeline.engine().calls.is_empty());
}

#[tokio::test]
async fn stages_are_reported_in_order() {
    let source = project();
    let records = tempfile::tempdir().unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut pipeline = Pipeline::new(FakeEngine::new(), options(&source, &records))
        .on_stage(move |stage| sink.borrow_mut().push(stage));
    pipeline.run().await.unwrap();

    let mut expected = Stage::SEQUENCE.to_vec();
    expected.push(Stage::Done);
    assert_eq!(*seen.borrow(), expected);
}

#[test]
fn fingerprint_ignores_argument_order() {
    let a = HashMap::from([
        ("SQLX_OFFLINE".to_string(), "true".to_string()),
        ("RUSTFLAGS".to_string(), "-Clink-arg=-fuse-ld=lld".to_string()),
    ]);
    let b = HashMap::from([
        ("RUSTFLAGS".to_string(), "-Clink-arg=-fuse-ld=lld".to_string()),
        ("SQLX_OFFLINE".to_string(), "true".to_string()),
    ]);
    assert_eq!(fingerprint("FROM x", &a, "d", None), fingerprint("FROM x", &b, "d", None));

    let mut c = a.clone();
    c.insert("SQLX_OFFLINE".to_string(), "false".to_string());
    assert_ne!(fingerprint("FROM x", &a, "d", None), fingerprint("FROM x", &c, "d", None));
    assert_ne!(fingerprint("FROM x", &a, "d", None), fingerprint("FROM x", &a, "e", None));
    assert_ne!(fingerprint("FROM x", &a, "d", None), fingerprint("FROM y", &a, "d", None));
    assert_ne!(
        fingerprint("FROM x", &a, "d", Some("sha256:base-1")),
        fingerprint("FROM x", &a, "d", Some("sha256:base-2"))
    );
}

#[tokio::test]
async fn reproducibility_compares_two_clean_builds() {
    let source = project();
    let records = tempfile::tempdir().unwrap();

    let (report, engine) = check_reproducibility(FakeEngine::new(), options(&source, &records))
        .await
        .unwrap();
    assert!(report.identical());
    assert_eq!(report.binary_path, BINARY);
    assert!(!report.first.cached && !report.second.cached);
    assert_eq!(engine.count("build"), 2);
    assert_eq!(engine.count("digest"), 2);
    assert!(load_record(records.path(), "zer02prod:local").is_none());

    let mut engine = FakeEngine::new();
    engine.digests = VecDeque::from(["a".repeat(64), "b".repeat(64)]);
    let (report, _) = check_reproducibility(engine, options(&source, &records))
        .await
        .unwrap();
    assert!(!report.identical());
}

//! Build twice from scratch and compare the binaries

use serde::Serialize;

use super::{BuildError, BuildReport, ImageEngine, Pipeline, PipelineOptions};
use crate::recipe::Stage;

/// Binary digests of two clean builds of the same inputs
#[derive(Debug, Clone, Serialize)]
pub struct ReproducibilityReport {
    pub binary_path: String,
    pub first: BuildReport,
    pub second: BuildReport,
    pub first_digest: String,
    pub second_digest: String,
}

impl ReproducibilityReport {
    pub fn identical(&self) -> bool {
        self.first_digest == self.second_digest
    }
}

/// Build the recipe twice without any cache and hash the binary of each image
///
/// Returns the engine so callers can keep using it.
pub async fn check_reproducibility<E: ImageEngine>(
    engine: E,
    mut options: PipelineOptions,
) -> Result<(ReproducibilityReport, E), BuildError> {
    options.no_cache = true;
    options.records_dir = None;
    let binary_path = options.recipe.entrypoint.path.clone();

    let (first, first_digest, engine) = build_and_hash(engine, options.clone(), &binary_path).await?;
    let (second, second_digest, engine) = build_and_hash(engine, options, &binary_path).await?;

    if first_digest == second_digest {
        tracing::info!("Binary is byte-identical across builds ({first_digest})");
    } else {
        tracing::warn!("Binary differs between builds: {first_digest} vs {second_digest}");
    }

    Ok((
        ReproducibilityReport {
            binary_path,
            first,
            second,
            first_digest,
            second_digest,
        },
        engine,
    ))
}

async fn build_and_hash<E: ImageEngine>(
    engine: E,
    options: PipelineOptions,
    binary_path: &str,
) -> Result<(BuildReport, String, E), BuildError> {
    let mut pipeline = Pipeline::new(engine, options);
    let report = pipeline.run().await?;
    let mut engine = pipeline.into_engine();
    let digest = engine
        .file_digest(&report.image_id, binary_path)
        .await
        .map_err(|source| BuildError::Engine {
            stage: Stage::Done,
            source,
        })?;
    Ok((report, digest, engine))
}

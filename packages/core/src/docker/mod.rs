//! Docker operations module
//!
//! - Docker client wrapper with connection handling
//! - Docker-specific error types
//! - Base image pull and streaming image build
//! - Image inspection, tagging and removal
//! - Running, verifying and extracting from built images
//! - Progress reporting for pulls and builds

pub mod artifact;
mod client;
pub mod container;
mod error;
pub mod image;
pub mod progress;

use rand::Rng;
use rand::distr::Alphanumeric;

pub use client::{BUILD_REQUEST_TIMEOUT, DockerClient};
pub use error::DockerError;
pub use progress::ProgressReporter;

pub use artifact::binary_digest;
pub use container::{LaunchReport, OutputStream, inspect_launch, remove_container, run_image};
pub use image::{
    BuildRequest, ImageConfig, build_image, image_exists, inspect_image_config, pull_base_image,
    remove_image, split_reference, tag_image,
};

/// Label carrying the build fingerprint
pub const LABEL_FINGERPRINT: &str = "dev.z2p-image.fingerprint";

/// Label carrying the source tree digest
pub const LABEL_SOURCE_DIGEST: &str = "dev.z2p-image.source-digest";

const SESSION_ID_LEN: usize = 12;

/// Short random id for candidate tags and throwaway containers
pub fn session_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

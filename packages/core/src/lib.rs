//! zer02prod-image-core - Core library for z2p-image
//!
//! This library turns a source tree into a container image whose entry point
//! is the `zer02prod` release binary. It provides the build recipe model,
//! build-context materialization, Docker integration and the staged pipeline
//! that ties them together.

pub mod config;
pub mod context;
pub mod docker;
pub mod pipeline;
pub mod recipe;
pub mod version;

pub use config::{Config, load_config, save_config};
pub use version::{BuildInfo, build_info, get_version, get_version_long};

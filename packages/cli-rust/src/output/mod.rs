//! Output utilities for CLI commands
//!
//! This module provides terminal output helpers including spinners
//! with elapsed time display for daemon round trips, stage and check
//! styling, and centralized formatting for Docker and build errors.

pub mod colors;
pub mod errors;
pub mod spinner;

pub use colors::{CheckStatus, check_marker, stage_counter, stage_style};
pub use errors::{format_build_error, format_docker_error, format_docker_error_anyhow};
pub use spinner::CommandSpinner;

/// First 12 hex digits of an image id or digest, the way `docker images` shows them
pub fn short_id(id: &str) -> &str {
    let hex = id.strip_prefix("sha256:").unwrap_or(id);
    &hex[..12.min(hex.len())]
}

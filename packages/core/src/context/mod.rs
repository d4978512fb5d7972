//! Build context materialization
//!
//! The source tree is never sent to the daemon as-is. An explicit manifest
//! decides which files go in, the selected files are walked in sorted order,
//! and the result is packed into one gzipped tar together with the generated
//! Dockerfile. The same selection feeds the source digest used for caching.

mod archive;
mod ignore;
mod tree;

use std::path::PathBuf;

use thiserror::Error;

pub use archive::build_context_archive;
pub use ignore::{DEFAULT_EXCLUDES, IGNORE_FILE_NAME, IgnoreManifest};
pub use tree::{EntryKind, SourceFile, SourceTree, archive_path, collect_source_tree};

/// Errors raised while selecting or packing the build context
#[derive(Error, Debug)]
pub enum ContextError {
    /// Source root is missing or not a directory
    #[error("Source directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Pattern in an ignore file or the configuration is malformed
    #[error("Invalid context pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// File could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory walk failed
    #[error("Failed to walk {}: {reason}", .path.display())]
    Walk { path: PathBuf, reason: String },

    /// Tar or gzip encoding failed
    #[error("Failed to create build context archive: {0}")]
    Archive(#[from] std::io::Error),
}

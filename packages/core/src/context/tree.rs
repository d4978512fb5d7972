//! Source tree collection and digesting

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{ContextError, IgnoreManifest};
use crate::recipe::DOCKERFILE_NAME;

/// What a context entry is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink(PathBuf),
}

/// One file selected for the build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the source root, always `/`-separated in the archive
    pub relative: PathBuf,
    pub absolute: PathBuf,
    /// Normalized to 0o755 or 0o644
    pub mode: u32,
    pub size: u64,
    pub kind: EntryKind,
}

/// The selected files of a source tree, sorted by path
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    files: Vec<SourceFile>,
}

impl SourceTree {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Whether a file or anything below a directory was selected
    pub fn contains(&self, relative: &Path) -> bool {
        self.files.iter().any(|f| f.relative.starts_with(relative))
    }

    /// SHA-256 over paths, modes and contents, in path order
    ///
    /// Timestamps and ownership are not part of the digest, so an unchanged
    /// checkout always hashes the same.
    pub fn digest(&self) -> Result<String, ContextError> {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(archive_path(&file.relative).as_bytes());
            hasher.update(b"\0");
            hasher.update(format!("{:o}", file.mode).as_bytes());
            hasher.update(b"\0");
            match &file.kind {
                EntryKind::File => {
                    hash_file_into(&file.absolute, &mut hasher)?;
                }
                EntryKind::Symlink(target) => {
                    hasher.update(b"link:");
                    hasher.update(target.to_string_lossy().as_bytes());
                }
            }
            hasher.update(b"\0");
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Walk `root` and keep every file the manifest allows
///
/// Excluded directories are pruned unless a negated rule could bring
/// something below them back.
pub fn collect_source_tree(
    root: &Path,
    manifest: &IgnoreManifest,
) -> Result<SourceTree, ContextError> {
    if !root.is_dir() {
        return Err(ContextError::NotADirectory(root.to_path_buf()));
    }

    let can_prune = !manifest.has_negations();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                return true;
            };
            if can_prune && manifest.is_excluded(relative) {
                return false;
            }
            manifest.is_included(relative, true)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ContextError::Walk {
                path,
                reason: e.to_string(),
            }
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ContextError::Walk {
                path: entry.path().to_path_buf(),
                reason: "path escapes the source root".to_string(),
            })?
            .to_path_buf();

        if relative == Path::new(DOCKERFILE_NAME) || !manifest.allows(&relative) {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| ContextError::Walk {
            path: entry.path().to_path_buf(),
            reason: e.to_string(),
        })?;

        let kind = if file_type.is_symlink() {
            let target =
                std::fs::read_link(entry.path()).map_err(|source| ContextError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            EntryKind::Symlink(target)
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            tracing::debug!("Skipping special file {}", entry.path().display());
            continue;
        };

        let size = match kind {
            EntryKind::File => metadata.len(),
            EntryKind::Symlink(_) => 0,
        };

        files.push(SourceFile {
            relative,
            absolute: entry.path().to_path_buf(),
            mode: normalized_mode(&metadata),
            size,
            kind,
        });
    }

    tracing::debug!(
        "Collected {} files from {}",
        files.len(),
        root.display()
    );

    Ok(SourceTree {
        root: root.to_path_buf(),
        files,
    })
}

/// Path as stored in the archive: `/`-separated, relative
pub fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn normalized_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn normalized_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

fn hash_file_into(path: &Path, hasher: &mut Sha256) -> Result<(), ContextError> {
    let io_err = |source| ContextError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(())
}

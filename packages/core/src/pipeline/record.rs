//! Records of successful builds
//!
//! One JSON file per image reference under the data directory. The last
//! record for a reference decides whether an unchanged build can be skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a successful build produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Final reference, `name:tag`
    pub image: String,
    pub image_id: String,
    pub fingerprint: String,
    pub source_digest: String,
    pub built_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Path of the record for `reference` inside `dir`
pub fn record_path(dir: &Path, reference: &str) -> PathBuf {
    let file_name: String = reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{file_name}.json"))
}

pub fn save_record(dir: &Path, record: &BuildRecord) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create records directory: {}", dir.display()))?;

    let path = record_path(dir, &record.image);
    let json = serde_json::to_string_pretty(record).context("Failed to serialize build record")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write build record: {}", path.display()))?;
    tracing::debug!("Saved build record to {}", path.display());
    Ok(())
}

/// Last record for `reference`; unreadable records count as absent
pub fn load_record(dir: &Path, reference: &str) -> Option<BuildRecord> {
    let path = record_path(dir, reference);
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Ignoring unreadable build record {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildRecord {
        BuildRecord {
            image: "zer02prod:local".to_string(),
            image_id: "sha256:abc".to_string(),
            fingerprint: "f".repeat(64),
            source_digest: "d".repeat(64),
            built_at: Utc::now(),
            duration_ms: 1234,
        }
    }

    #[test]
    fn record_path_is_filesystem_safe() {
        let path = record_path(Path::new("/data"), "localhost:5000/zer02prod:v1");
        assert_eq!(path, Path::new("/data/localhost_5000_zer02prod_v1.json"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample();
        save_record(dir.path(), &record).unwrap();
        assert_eq!(load_record(dir.path(), "zer02prod:local"), Some(record));
        assert_eq!(load_record(dir.path(), "zer02prod:other"), None);
    }

    #[test]
    fn corrupt_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(record_path(dir.path(), "zer02prod:local"), "{not json").unwrap();
        assert_eq!(load_record(dir.path(), "zer02prod:local"), None);
    }
}

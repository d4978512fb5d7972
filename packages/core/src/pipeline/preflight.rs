//! Checks run before the first stage
//!
//! They catch, on the client, failures the daemon would otherwise report
//! only after pulling the base image and installing packages.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::BuildError;
use crate::context::SourceTree;
use crate::recipe::Recipe;

/// Locations where captured query metadata may live, in order of preference
pub const OFFLINE_METADATA_PATHS: &[&str] = &[".sqlx", "sqlx-data.json"];

/// Files the binary may read from its working directory at start-up
const RUNTIME_FILE_HINTS: &[&str] = &["configuration", "configuration.yaml"];

#[derive(Debug, Deserialize)]
struct CargoManifest {
    package: Option<PackageSection>,
    #[serde(default)]
    bin: Vec<BinTarget>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
    #[serde(default = "default_true")]
    autobins: bool,
}

#[derive(Debug, Deserialize)]
struct BinTarget {
    name: Option<String>,
    path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Findings of a successful preflight
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    /// Where the binary target is declared
    pub binary_source: PathBuf,
    /// Whether compile-time database checks read captured metadata
    pub offline: bool,
    /// Captured metadata location, when offline
    pub offline_metadata: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Validate the source tree against the recipe
pub fn run_preflight(
    source_root: &Path,
    recipe: &Recipe,
    tree: &SourceTree,
) -> Result<PreflightReport, BuildError> {
    if !source_root.is_dir() {
        return Err(BuildError::SourceMaterialization(format!(
            "Source directory {} does not exist",
            source_root.display()
        )));
    }

    let binary = &recipe.compile.binary;
    let binary_source = find_binary_target(source_root, binary)?;
    if !tree.contains(&binary_source) {
        return Err(BuildError::SourceMaterialization(format!(
            "{} declares binary '{binary}' but is excluded from the build context",
            binary_source.display()
        )));
    }
    if !tree.contains(Path::new("Cargo.toml")) {
        return Err(BuildError::SourceMaterialization(
            "Cargo.toml is excluded from the build context".to_string(),
        ));
    }

    let mut report = PreflightReport {
        binary_source,
        offline: recipe.compile.offline(),
        ..Default::default()
    };

    if report.offline {
        report.offline_metadata = Some(find_offline_metadata(source_root, tree)?);
    } else {
        report.warnings.push(
            "Offline query metadata is disabled: compilation needs a reachable database via DATABASE_URL inside the build"
                .to_string(),
        );
    }

    if recipe.compile.locked && !tree.contains(Path::new("Cargo.lock")) {
        return Err(BuildError::Configuration(
            "locked builds need Cargo.lock in the build context".to_string(),
        ));
    }
    if !tree.contains(Path::new("Cargo.lock")) {
        report
            .warnings
            .push("Cargo.lock is not in the build context; dependency versions may drift between builds".to_string());
    }

    for hint in RUNTIME_FILE_HINTS {
        let path = Path::new(hint);
        if source_root.join(path).exists() && !tree.contains(path) {
            report.warnings.push(format!(
                "{hint} exists but is excluded; the binary may expect it in {} at start-up",
                recipe.workdir
            ));
        }
    }

    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    Ok(report)
}

/// Locate the source file that produces `binary`, relative to the root
fn find_binary_target(source_root: &Path, binary: &str) -> Result<PathBuf, BuildError> {
    let manifest_path = source_root.join("Cargo.toml");
    let contents = std::fs::read_to_string(&manifest_path).map_err(|e| {
        BuildError::SourceMaterialization(format!(
            "Cannot read {}: {e}",
            manifest_path.display()
        ))
    })?;
    let manifest: CargoManifest = toml::from_str(&contents).map_err(|e| {
        BuildError::SourceMaterialization(format!(
            "Cannot parse {}: {e}",
            manifest_path.display()
        ))
    })?;

    let Some(package) = manifest.package else {
        return Err(BuildError::SourceMaterialization(
            "Cargo.toml has no [package]; point the source directory at the crate that builds the binary".to_string(),
        ));
    };

    let explicit = manifest
        .bin
        .iter()
        .find(|target| target.name.as_deref().unwrap_or(&package.name) == binary);
    if let Some(target) = explicit {
        let path = match &target.path {
            Some(path) => PathBuf::from(path),
            None if package.name == binary => PathBuf::from("src/main.rs"),
            None => PathBuf::from(format!("src/bin/{binary}.rs")),
        };
        return Ok(path);
    }

    if package.autobins {
        let candidates = [
            (package.name == binary).then(|| PathBuf::from("src/main.rs")),
            Some(PathBuf::from(format!("src/bin/{binary}.rs"))),
            Some(PathBuf::from(format!("src/bin/{binary}/main.rs"))),
        ];
        if let Some(found) = candidates
            .into_iter()
            .flatten()
            .find(|candidate| source_root.join(candidate).is_file())
        {
            return Ok(found);
        }
    }

    Err(BuildError::SourceMaterialization(format!(
        "Package '{}' does not produce a binary named '{binary}'",
        package.name
    )))
}

/// First metadata location that exists and has files in the build context
///
/// An empty `.sqlx/`, or one whose files are all excluded, leaves the
/// compiler nothing to read.
fn find_offline_metadata(source_root: &Path, tree: &SourceTree) -> Result<PathBuf, BuildError> {
    let mut excluded = Vec::new();
    for candidate in OFFLINE_METADATA_PATHS {
        let path = Path::new(candidate);
        if !source_root.join(path).exists() {
            continue;
        }
        if tree.contains(path) {
            return Ok(path.to_path_buf());
        }
        excluded.push(*candidate);
    }

    if excluded.is_empty() {
        Err(BuildError::Configuration(
            "Offline query metadata is enabled but neither .sqlx/ nor sqlx-data.json exists. Run 'cargo sqlx prepare' or set SQLX_OFFLINE=false.".to_string(),
        ))
    } else {
        Err(BuildError::Configuration(format!(
            "Offline query metadata {} has no files in the build context. Run 'cargo sqlx prepare' or check the include and exclude patterns.",
            excluded.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::{IgnoreManifest, collect_source_tree};

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn project() -> tempfile::TempDir {
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

    fn check(root: &Path, config: &Config) -> Result<PreflightReport, BuildError> {
        let recipe = Recipe::from_config(config).unwrap();
        let manifest = IgnoreManifest::load(root, &config.include, &config.exclude).unwrap();
        let tree = collect_source_tree(root, &manifest).unwrap();
        run_preflight(root, &recipe, &tree)
    }

    #[test]
    fn default_project_passes() {
        let dir = project();
        let report = check(dir.path(), &Config::default()).unwrap();
        assert_eq!(report.binary_source, PathBuf::from("src/main.rs"));
        assert!(report.offline);
        assert_eq!(report.offline_metadata, Some(PathBuf::from(".sqlx")));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn explicit_bin_target_is_found() {
        let dir = project();
        write(
            dir.path(),
            "Cargo.toml",
            "[package]\nname = \"newsletter\"\n\n[[bin]]\nname = \"zer02prod\"\npath = \"src/main.rs\"\n",
        );
        let report = check(dir.path(), &Config::default()).unwrap();
        assert_eq!(report.binary_source, PathBuf::from("src/main.rs"));
    }

    #[test]
    fn src_bin_target_is_found() {
        let dir = project();
        write(dir.path(), "src/bin/seed_user.rs", "fn main() {}\n");
        let config = Config {
            binary_name: "seed_user".to_string(),
            ..Config::default()
        };
        let report = check(dir.path(), &config).unwrap();
        assert_eq!(report.binary_source, PathBuf::from("src/bin/seed_user.rs"));
    }

    #[test]
    fn missing_binary_is_a_source_failure() {
        let dir = project();
        let config = Config {
            binary_name: "other".to_string(),
            ..Config::default()
        };
        let err = check(dir.path(), &config).unwrap_err();
        assert!(matches!(err, BuildError::SourceMaterialization(_)));
    }

    #[test]
    fn invalid_manifest_is_a_source_failure() {
        let dir = project();
        write(dir.path(), "Cargo.toml", "[package\nname = ");
        let err = check(dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, BuildError::SourceMaterialization(_)));
    }

    #[test]
    fn offline_without_metadata_fails_deterministically() {
        let dir = project();
        std::fs::remove_dir_all(dir.path().join(".sqlx")).unwrap();
        for _ in 0..2 {
            let err = check(dir.path(), &Config::default()).unwrap_err();
            assert!(matches!(err, BuildError::Configuration(_)));
            assert!(err.to_string().contains("cargo sqlx prepare"));
        }
    }

    #[test]
    fn legacy_metadata_file_is_accepted() {
        let dir = project();
        std::fs::remove_dir_all(dir.path().join(".sqlx")).unwrap();
        write(dir.path(), "sqlx-data.json", "{}");
        let report = check(dir.path(), &Config::default()).unwrap();
        assert_eq!(report.offline_metadata, Some(PathBuf::from("sqlx-data.json")));
    }

    #[test]
    fn excluded_metadata_is_reported() {
        let dir = project();
        let config = Config {
            exclude: vec![".sqlx".to_string()],
            ..Config::default()
        };
        let err = check(dir.path(), &config).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
        assert!(err.to_string().contains("no files in the build context"));
    }

    #[test]
    fn metadata_files_excluded_by_pattern_are_reported() {
        let dir = project();
        let config = Config {
            exclude: vec![".sqlx/*".to_string()],
            ..Config::default()
        };
        let err = check(dir.path(), &config).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)), "{err:?}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn empty_metadata_directory_is_reported() {
        let dir = project();
        std::fs::remove_file(dir.path().join(".sqlx/query-1.json")).unwrap();
        let err = check(dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)), "{err:?}");
        assert!(err.to_string().contains(".sqlx"));
    }

    #[test]
    fn online_mode_warns_about_database() {
        let dir = project();
        std::fs::remove_dir_all(dir.path().join(".sqlx")).unwrap();
        let config = Config {
            compile_flags: vec!["SQLX_OFFLINE=false".to_string()],
            ..Config::default()
        };
        let report = check(dir.path(), &config).unwrap();
        assert!(!report.offline);
        assert!(report.warnings.iter().any(|w| w.contains("DATABASE_URL")));
    }

    #[test]
    fn locked_build_requires_lockfile() {
        let dir = project();
        std::fs::remove_file(dir.path().join("Cargo.lock")).unwrap();
        let config = Config {
            locked: true,
            ..Config::default()
        };
        assert!(matches!(
            check(dir.path(), &config),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn excluded_runtime_configuration_is_flagged() {
        let dir = project();
        write(dir.path(), "configuration/base.yaml", "application_port: 8000\n");
        let config = Config {
            exclude: vec!["configuration".to_string()],
            ..Config::default()
        };
        let report = check(dir.path(), &config).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("configuration")));
    }
}

//! Path resolution for z2p-image
//!
//! The project configuration lives next to the sources it describes, while
//! build records go to an XDG-style data directory:
//! - Linux/macOS: `~/.local/share/z2p-image/`
//! - Windows: `%LOCALAPPDATA%\z2p-image\`

use std::path::{Path, PathBuf};

/// File name of the project configuration inside the source root
pub const CONFIG_FILE_NAME: &str = "z2p-image.jsonc";

/// Get the project configuration path for a source root
///
/// Returns: `{source_root}/z2p-image.jsonc`
pub fn get_config_path(source_root: &Path) -> PathBuf {
    source_root.join(CONFIG_FILE_NAME)
}

/// Get the data directory path
///
/// Returns the directory where build records are stored:
/// - Linux: `~/.local/share/z2p-image/`
/// - macOS: `~/.local/share/z2p-image/` (XDG-style, not ~/Library)
/// - Windows: `%LOCALAPPDATA%\z2p-image\`
pub fn get_data_dir() -> Option<PathBuf> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        directories::BaseDirs::new().map(|dirs| {
            dirs.home_dir()
                .join(".local")
                .join("share")
                .join("z2p-image")
        })
    }
    #[cfg(target_os = "windows")]
    {
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .map(|d| d.join("z2p-image"))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

/// Get the directory holding one build record per image reference
///
/// Returns: `{data_dir}/records`
pub fn get_records_dir() -> Option<PathBuf> {
    get_data_dir().map(|d| d.join("records"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_in_source_root() {
        let path = get_config_path(Path::new("/src/zer02prod"));
        assert_eq!(path, PathBuf::from("/src/zer02prod/z2p-image.jsonc"));
    }

    #[test]
    fn test_data_dir_exists() {
        let dir = get_data_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("z2p-image"));
    }

    #[test]
    fn test_records_dir_is_inside_data_dir() {
        let records = get_records_dir().unwrap();
        assert!(records.ends_with("records"));
        assert!(records.starts_with(get_data_dir().unwrap()));
    }
}

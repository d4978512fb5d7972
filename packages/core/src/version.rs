//! Version information for z2p-image
//!
//! Release builds set `Z2P_GIT_HASH` and `Z2P_BUILD_DATE` at compile time.

use serde::Serialize;

/// Version of this build and, when known, where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: Option<&'static str>,
    pub build_date: Option<&'static str>,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("Z2P_GIT_HASH").filter(|s| !s.is_empty()),
        build_date: option_env!("Z2P_BUILD_DATE").filter(|s| !s.is_empty()),
    }
}

pub fn get_version() -> String {
    build_info().version.to_string()
}

/// Version plus the git hash and build date when they were recorded
pub fn get_version_long() -> String {
    let info = build_info();
    let details: Vec<String> = [
        info.git_hash.map(|hash| format!("git {hash}")),
        info.build_date.map(|date| format!("built {date}")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if details.is_empty() {
        info.version.to_string()
    } else {
        format!("{} ({})", info.version, details.join(", "))
    }
}

//! Repository, version and validation responses.

use serde::Deserialize;
use serde_json::Value;

/// Label value used when the tool omits a version field.
pub const UNKNOWN: &str = "unknown";

/// Output of `kopia repository status --json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RepositoryStatus {
    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub blob: BlobStats,
}

/// Blob statistics of the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BlobStats {
    #[serde(default)]
    pub count: u64,
}

/// Output of `kopia version --json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub build_info: BuildInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    #[serde(default)]
    pub build_version: Option<String>,
}

impl VersionInfo {
    pub fn version_label(&self) -> &str {
        self.version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn build_label(&self) -> &str {
        self.build_info.build_version.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Output of `kopia snapshot verify --all --json`.
///
/// Kept as raw JSON: only a boolean `true` under `success` counts as a pass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ValidationResult(pub Value);

impl ValidationResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.0.get("success"), Some(Value::Bool(true)))
    }
}

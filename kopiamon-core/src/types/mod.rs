//! Data model for the JSON the backup tool emits.

pub mod repository;
pub mod snapshot;

pub use repository::{BlobStats, BuildInfo, RepositoryStatus, ValidationResult, VersionInfo};
pub use snapshot::{epoch_seconds, latest_by_start_time, SnapshotRecord, SnapshotStats};

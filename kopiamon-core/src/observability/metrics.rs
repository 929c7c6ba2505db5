//! Kopia metric definitions and the Prometheus-backed sink.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters and counts
//! - `_seconds` suffix for durations and timestamps
//! - `_bytes` suffix for gauges measuring size

use std::sync::Mutex;

use metrics::{counter, describe_counter, describe_gauge, gauge, Label};

use crate::collector::MetricsSink;

pub const BACKUP_SIZE_BYTES: &str = "kopia_backup_size_bytes";
pub const BACKUP_FILES_TOTAL: &str = "kopia_backup_files_total";
pub const BACKUP_AGE_SECONDS: &str = "kopia_backup_age_seconds";
pub const BACKUP_LAST_TIMESTAMP_SECONDS: &str = "kopia_backup_last_timestamp_seconds";
pub const BACKUP_DURATION_SECONDS: &str = "kopia_backup_duration_seconds";
pub const BACKUP_STATUS: &str = "kopia_backup_status";
pub const REPOSITORY_SIZE_BYTES: &str = "kopia_repository_size_bytes";
pub const REPOSITORY_BLOBS_TOTAL: &str = "kopia_repository_blobs_total";
pub const REPOSITORY_STATUS: &str = "kopia_repository_status";
pub const BACKUP_ERRORS_TOTAL: &str = "kopia_backup_errors_total";
pub const BACKUP_VALIDATION: &str = "kopia_backup_validation";
pub const KOPIA_INFO: &str = "kopia_info";

/// Register all Kopia metrics with descriptions.
///
/// This ensures metrics appear in `/metrics` with proper metadata.
pub fn register_kopia_metrics() {
    // Latest snapshot
    describe_gauge!(BACKUP_SIZE_BYTES, "Size of latest backup");
    describe_gauge!(BACKUP_FILES_TOTAL, "Number of files in latest backup");
    describe_gauge!(BACKUP_AGE_SECONDS, "Age of latest backup");
    describe_gauge!(BACKUP_LAST_TIMESTAMP_SECONDS, "Start time of latest backup (unix seconds)");
    describe_gauge!(BACKUP_DURATION_SECONDS, "Duration of latest backup");
    describe_gauge!(BACKUP_STATUS, "Latest backup completed without error (1=complete, 0=failed)");

    // Repository
    describe_gauge!(REPOSITORY_SIZE_BYTES, "Total repository size");
    describe_gauge!(REPOSITORY_BLOBS_TOTAL, "Total number of blobs");
    describe_gauge!(
        REPOSITORY_STATUS,
        "Repository status query outcome (1=answered, 0=failed)"
    );

    // Health of the collection itself
    describe_counter!(BACKUP_ERRORS_TOTAL, "Total number of backup errors");
    describe_gauge!(BACKUP_VALIDATION, "Backup validation status (1=success, 0=failed)");
    describe_gauge!(KOPIA_INFO, "Kopia version information");
}

/// [`MetricsSink`] that writes into the globally installed `metrics` recorder.
///
/// Info records are modelled as a gauge set to 1 for the current label set.
/// A superseded label set is reset to 0 so only one series reads 1.
#[derive(Default)]
pub struct PrometheusSink {
    current_info: Mutex<Option<Vec<Label>>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for PrometheusSink {
    fn set_gauge(&self, name: &'static str, value: f64) {
        gauge!(name).set(value);
    }

    fn inc_counter(&self, name: &'static str) {
        counter!(name).increment(1);
    }

    fn set_info(&self, name: &'static str, labels: &[(&'static str, String)]) {
        let labels: Vec<Label> =
            labels.iter().map(|(key, value)| Label::new(*key, value.clone())).collect();

        let mut current = match self.current_info.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = current.take() {
            if previous != labels {
                gauge!(name, previous).set(0.0);
            }
        }
        gauge!(name, labels.clone()).set(1.0);
        *current = Some(labels);
    }
}

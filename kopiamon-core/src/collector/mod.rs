//! Periodic collection of backup state into a metrics sink.
//!
//! One cycle runs four independent queries in sequence:
//!
//! ```text
//!   version ──► kopia_info{version,build}
//!   snapshot list ──► size / files / age / duration / status of the latest snapshot
//!   repository status ──► repository size / blob count / status
//!   snapshot verify --all ──► validation 1|0
//! ```
//!
//! A failing query is logged and counted in `kopia_backup_errors_total`; it never
//! stops the other queries or the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::observability::metrics as names;
use crate::runner::{decode_json, CommandRunner, KopiaCommand};
use crate::types::{
    epoch_seconds, latest_by_start_time, RepositoryStatus, SnapshotRecord, ValidationResult,
    VersionInfo,
};

mod sink;
#[cfg(test)]
mod tests;

pub use sink::{MemorySink, MetricsSink};

/// The independent query families of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Version,
    Snapshots,
    Repository,
    Validation,
}

impl Query {
    pub const ALL: [Query; 4] = [Query::Version, Query::Snapshots, Query::Repository, Query::Validation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Query::Version => "version",
            Query::Snapshots => "snapshots",
            Query::Repository => "repository",
            Query::Validation => "validation",
        }
    }

    fn command(&self) -> KopiaCommand {
        match self {
            Query::Version => KopiaCommand::new(["version"]),
            Query::Snapshots => KopiaCommand::new(["snapshot", "list"]),
            Query::Repository => KopiaCommand::new(["repository", "status"]),
            Query::Validation => KopiaCommand::new(["snapshot", "verify", "--all"]).long_running(),
        }
        .json()
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Queries that failed, with the error text.
    pub failures: Vec<(Query, String)>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Polls the backup tool and publishes what it reports.
#[derive(Clone)]
pub struct Collector {
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn MetricsSink>,
}

impl Collector {
    pub fn new(runner: Arc<dyn CommandRunner>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { runner, sink }
    }

    /// Run one cycle against the current wall clock.
    pub async fn collect_once(&self) -> CycleReport {
        self.collect_at(Utc::now()).await
    }

    /// Run one cycle, computing snapshot age relative to `now`.
    pub async fn collect_at(&self, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        for query in Query::ALL {
            let outcome = match query {
                Query::Version => self.collect_version().await,
                Query::Snapshots => self.collect_snapshots(now).await,
                Query::Repository => self.collect_repository().await,
                Query::Validation => self.collect_validation().await,
            };

            if let Err(e) = outcome {
                error!(query = %query, error = %e, "Error collecting metrics");
                self.sink.inc_counter(names::BACKUP_ERRORS_TOTAL);
                report.failures.push((query, e.to_string()));
            }
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Collect forever, sleeping `interval` after each cycle, until `shutdown` resolves.
    ///
    /// Each cycle runs on its own task so a panic inside it is counted as an error
    /// instead of taking the loop down. A cycle still running at shutdown is aborted.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(interval_secs = interval.as_secs(), "Collector loop started");

        loop {
            let collector = self.clone();
            let mut cycle = tokio::spawn(async move { collector.collect_once().await });

            tokio::select! {
                joined = &mut cycle => match joined {
                    Ok(report) if report.is_clean() => {
                        debug!(elapsed_ms = report.elapsed.as_millis() as u64, "Collection cycle complete");
                    }
                    Ok(report) => {
                        warn!(
                            failed = report.failures.len(),
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "Collection cycle finished with errors"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Unexpected error during collection cycle");
                        self.sink.inc_counter(names::BACKUP_ERRORS_TOTAL);
                    }
                },
                _ = &mut shutdown => {
                    // Wait for the aborted cycle so an in-flight child is killed before returning.
                    cycle.abort();
                    let _ = cycle.await;
                    break;
                }
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Collector loop stopped");
    }

    async fn collect_version(&self) -> Result<()> {
        let info: VersionInfo = self.query(Query::Version).await?;
        self.sink.set_info(
            names::KOPIA_INFO,
            &[
                ("version", info.version_label().to_string()),
                ("build", info.build_label().to_string()),
            ],
        );
        Ok(())
    }

    async fn collect_snapshots(&self, now: DateTime<Utc>) -> Result<()> {
        let snapshots: Vec<SnapshotRecord> = self.query(Query::Snapshots).await?;

        // Latest by start time. The point check uses raw list order instead.
        let Some(latest) = latest_by_start_time(&snapshots) else {
            debug!("No snapshots listed; keeping previous snapshot gauges");
            return Ok(());
        };

        // Parse before publishing so a bad record leaves every gauge untouched.
        let start = latest.parse_start_time()?;
        let end = latest.parse_end_time()?;
        let start_secs = epoch_seconds(start);

        self.sink.set_gauge(names::BACKUP_SIZE_BYTES, latest.stats.total_size as f64);
        self.sink.set_gauge(names::BACKUP_FILES_TOTAL, latest.stats.total_files as f64);
        self.sink.set_gauge(names::BACKUP_AGE_SECONDS, epoch_seconds(now) - start_secs);
        self.sink.set_gauge(names::BACKUP_LAST_TIMESTAMP_SECONDS, start_secs);
        self.sink.set_gauge(names::BACKUP_STATUS, if latest.is_complete() { 1.0 } else { 0.0 });
        if let Some(end) = end {
            self.sink.set_gauge(names::BACKUP_DURATION_SECONDS, epoch_seconds(end) - start_secs);
        }
        Ok(())
    }

    async fn collect_repository(&self) -> Result<()> {
        match self.query::<RepositoryStatus>(Query::Repository).await {
            Ok(status) => {
                self.sink.set_gauge(names::REPOSITORY_SIZE_BYTES, status.size as f64);
                self.sink.set_gauge(names::REPOSITORY_BLOBS_TOTAL, status.blob.count as f64);
                self.sink.set_gauge(names::REPOSITORY_STATUS, 1.0);
                Ok(())
            }
            Err(e) => {
                self.sink.set_gauge(names::REPOSITORY_STATUS, 0.0);
                Err(e)
            }
        }
    }

    async fn collect_validation(&self) -> Result<()> {
        let validation: ValidationResult = self.query(Query::Validation).await?;
        let value = if validation.succeeded() { 1.0 } else { 0.0 };
        self.sink.set_gauge(names::BACKUP_VALIDATION, value);
        Ok(())
    }

    async fn query<T: serde::de::DeserializeOwned>(&self, query: Query) -> Result<T> {
        let command = query.command();
        let output = self.runner.run(&command).await?;
        decode_json(&command, &output)
    }
}

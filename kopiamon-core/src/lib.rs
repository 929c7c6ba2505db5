//! kopiamon core library
//!
//! Shared types and logic for monitoring Kopia backups: the collector that feeds
//! the Prometheus exporter and the one-shot check used by polling agents.

pub mod check;
pub mod collector;
pub mod config;
pub mod error;
pub mod observability;
pub mod runner;
pub mod types;

// Re-export commonly used items
pub use check::{evaluate as evaluate_check, CheckResult, CheckStatus, CheckType};
pub use collector::{Collector, CycleReport, MemorySink, MetricsSink, Query};
pub use config::{CheckConfig, ExporterConfig};
pub use error::{KopiaError, Result};
pub use observability::{init_tracing, install_prometheus, metrics::PrometheusSink, LogTarget};
pub use runner::{CommandOutput, CommandRunner, DockerExecRunner, DockerRunRunner, KopiaCommand};
pub use types::{RepositoryStatus, SnapshotRecord, ValidationResult, VersionInfo};

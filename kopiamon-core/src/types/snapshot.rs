//! Snapshot records as reported by `kopia snapshot list --json`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::{KopiaError, Result};

/// Timestamp layout used by the tool in snapshot listings (fraction optional).
const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A point-in-time backup record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    /// Snapshot manifest ID.
    #[serde(default)]
    pub id: String,

    /// ISO-8601 start time in UTC, e.g. `2024-01-01T00:00:00.123456Z`.
    #[serde(default)]
    pub start_time: Option<String>,

    /// Finish time, same layout as `start_time`.
    #[serde(default)]
    pub end_time: Option<String>,

    #[serde(default)]
    pub stats: SnapshotStats,

    /// Set by the tool when the snapshot was interrupted.
    #[serde(default)]
    pub incomplete: bool,

    #[serde(default)]
    pub error: Option<String>,
}

/// Size and file statistics of a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    #[serde(default)]
    pub total_size: u64,

    #[serde(default, alias = "fileCount")]
    pub total_files: u64,
}

impl SnapshotRecord {
    /// Raw start time, or the empty string when the tool omitted it.
    pub fn start_time_str(&self) -> &str {
        self.start_time.as_deref().unwrap_or("")
    }

    /// Parse the start time in the strict listing layout (`...Z` suffix required).
    pub fn parse_start_time(&self) -> Result<DateTime<Utc>> {
        parse_strict(self.require_start_time()?)
    }

    /// Parse the end time strictly; `None` when the tool did not report one.
    pub fn parse_end_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.end_time.as_deref().map(parse_strict).transpose()
    }

    /// Whether the snapshot finished without an error and was not interrupted.
    pub fn is_complete(&self) -> bool {
        !self.incomplete && self.error.as_deref().map_or(true, str::is_empty)
    }

    /// Parse the start time leniently: a trailing `Z` is stripped if present.
    pub fn parse_start_time_lenient(&self) -> Result<DateTime<Utc>> {
        let raw = self.require_start_time()?;
        parse_naive_utc(raw, raw.trim_end_matches('Z'))
    }

    fn require_start_time(&self) -> Result<&str> {
        self.start_time.as_deref().ok_or_else(|| KopiaError::InvalidTimestamp {
            value: String::new(),
            reason: format!("snapshot {} has no startTime", self.id),
        })
    }
}

fn parse_strict(raw: &str) -> Result<DateTime<Utc>> {
    let body = raw.strip_suffix('Z').ok_or_else(|| KopiaError::InvalidTimestamp {
        value: raw.to_string(),
        reason: "missing UTC 'Z' suffix".to_string(),
    })?;
    parse_naive_utc(raw, body)
}

fn parse_naive_utc(raw: &str, body: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(body, START_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| KopiaError::InvalidTimestamp { value: raw.to_string(), reason: e.to_string() })
}

/// Pick the latest snapshot by `startTime` (stable lexicographic sort, last wins).
pub fn latest_by_start_time(snapshots: &[SnapshotRecord]) -> Option<&SnapshotRecord> {
    let mut ordered: Vec<&SnapshotRecord> = snapshots.iter().collect();
    ordered.sort_by(|a, b| a.start_time_str().cmp(b.start_time_str()));
    ordered.last().copied()
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9
}

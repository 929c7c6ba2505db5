//! One-shot backup check for a single volume.
//!
//! Lists the snapshots of a volume in a scoped container, verifies the most
//! recent one, and reduces the outcome to a [`CheckResult`]. Errors never
//! escape [`evaluate`]: they become a `failed` result carrying the error text.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::error::{KopiaError, Result};
use crate::runner::{decode_json, CommandRunner, KopiaCommand};
use crate::types::{epoch_seconds, SnapshotRecord};

/// Prefix under which the checked volume is mounted inside the container.
pub const BACKUP_MOUNT_PREFIX: &str = "/backup";

pub const MSG_NO_SNAPSHOTS: &str = "No snapshots found";
pub const MSG_VERIFIED: &str = "Backup verified";
pub const MSG_VERIFY_FAILED: &str = "Verification failed";

/// What the monitoring agent asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    Status,
    Validation,
    LastTime,
}

impl FromStr for CheckType {
    type Err = KopiaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "status" => Ok(Self::Status),
            "validation" => Ok(Self::Validation),
            "last_time" => Ok(Self::LastTime),
            other => Err(KopiaError::UnknownCheckType { check_type: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Success,
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one volume. Built fresh per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub status: CheckStatus,
    /// Start time of the latest snapshot in unix seconds, 0 when unknown.
    pub last_time: f64,
    pub message: String,
}

impl CheckResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: CheckStatus::Failed, last_time: 0.0, message: message.into() }
    }

    /// The single stdout line for `check_type`.
    pub fn render(&self, check_type: CheckType) -> String {
        match check_type {
            CheckType::Status | CheckType::Validation => self.status.to_string(),
            CheckType::LastTime => format!("{:?}", self.last_time),
        }
    }
}

/// Container path mirroring a host volume path under [`BACKUP_MOUNT_PREFIX`].
pub fn mirrored_path(volume: &Path) -> PathBuf {
    PathBuf::from(format!("{}{}", BACKUP_MOUNT_PREFIX, volume.display()))
}

/// Check the backups of `volume`. Never fails: errors turn into a `failed` result.
#[instrument(skip(runner, volume), fields(volume = %volume.display()))]
pub async fn evaluate(runner: &dyn CommandRunner, volume: &Path) -> CheckResult {
    match try_evaluate(runner, volume).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Backup check failed");
            CheckResult::failed(e.to_string())
        }
    }
}

async fn try_evaluate(runner: &dyn CommandRunner, volume: &Path) -> Result<CheckResult> {
    let scoped = mirrored_path(volume);
    let list = KopiaCommand::new(["snapshot", "list"])
        .arg(scoped.display().to_string())
        .json()
        .mount_read_only(volume, &scoped);

    let output = runner.run(&list).await?;
    let snapshots: Vec<SnapshotRecord> = decode_json(&list, &output)?;

    // Raw list order, unlike the collector which sorts by start time.
    let Some(latest) = snapshots.last() else {
        return Ok(CheckResult::failed(MSG_NO_SNAPSHOTS));
    };

    let started = latest.parse_start_time_lenient()?;
    let age = (Utc::now() - started).num_seconds();
    debug!(snapshot = %latest.id, age_secs = age, "Verifying latest snapshot");

    let verify = KopiaCommand::new(["snapshot", "verify"]).arg(latest.id.clone()).long_running();
    let verified = runner.run(&verify).await?.success();

    Ok(CheckResult {
        status: if verified { CheckStatus::Success } else { CheckStatus::Failed },
        last_time: epoch_seconds(started),
        message: if verified { MSG_VERIFIED } else { MSG_VERIFY_FAILED }.to_string(),
    })
}

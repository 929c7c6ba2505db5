//! Configuration management.
//!
//! Both binaries are configured from environment variables. Parsing goes through
//! a lookup function so tests never touch the process environment.

use crate::error::{KopiaError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CONTAINER_NAME: &str = "KOPIA_CONTAINER_NAME";
pub const ENV_EXPORTER_PORT: &str = "KOPIA_EXPORTER_PORT";
pub const ENV_INTERVAL_SECS: &str = "KOPIA_EXPORTER_INTERVAL_SECS";
pub const ENV_COMMAND_TIMEOUT_SECS: &str = "KOPIA_COMMAND_TIMEOUT_SECS";
pub const ENV_VERIFY_TIMEOUT_SECS: &str = "KOPIA_VERIFY_TIMEOUT_SECS";
pub const ENV_DOCKER_BIN: &str = "KOPIA_DOCKER_BIN";
pub const ENV_IMAGE: &str = "KOPIA_IMAGE";
pub const ENV_CONFIG_DIR: &str = "KOPIA_CONFIG_DIR";
pub const ENV_CACHE_DIR: &str = "KOPIA_CACHE_DIR";

pub const DEFAULT_CONTAINER_NAME: &str = "kopia-server";
pub const DEFAULT_EXPORTER_PORT: u16 = 9091;
pub const DEFAULT_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_IMAGE: &str = "kopia/kopia:latest";

/// Settings for the long-running exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Container the tool runs in (`docker exec` target).
    pub container_name: String,
    /// Metrics listener port, bound on all interfaces.
    pub port: u16,
    /// Sleep between collection cycles.
    pub interval: Duration,
    /// Per-command timeout; `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// Timeout for `snapshot verify`, which reads back repository content.
    pub verify_timeout: Option<Duration>,
    pub docker_bin: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            port: DEFAULT_EXPORTER_PORT,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            command_timeout: Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
            verify_timeout: Some(Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS)),
            docker_bin: DEFAULT_DOCKER_BIN.to_string(),
        }
    }
}

impl ExporterConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let interval_secs = parse_var(&lookup, ENV_INTERVAL_SECS, DEFAULT_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(KopiaError::InvalidConfig {
                reason: format!("{} must be greater than zero", ENV_INTERVAL_SECS),
            });
        }

        Ok(Self {
            container_name: non_empty(&lookup, ENV_CONTAINER_NAME)
                .unwrap_or(defaults.container_name),
            port: parse_var(&lookup, ENV_EXPORTER_PORT, DEFAULT_EXPORTER_PORT)?,
            interval: Duration::from_secs(interval_secs),
            command_timeout: timeout_var(&lookup, ENV_COMMAND_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS)?,
            verify_timeout: timeout_var(&lookup, ENV_VERIFY_TIMEOUT_SECS, DEFAULT_VERIFY_TIMEOUT_SECS)?,
            docker_bin: non_empty(&lookup, ENV_DOCKER_BIN).unwrap_or(defaults.docker_bin),
        })
    }
}

/// Settings for the one-shot point check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    pub image: String,
    /// Host directory holding the tool's repository config.
    pub config_dir: PathBuf,
    /// Host directory holding the tool's cache.
    pub cache_dir: PathBuf,
    pub command_timeout: Option<Duration>,
    pub verify_timeout: Option<Duration>,
    pub docker_bin: String,
}

impl CheckConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = || {
            non_empty(&lookup, "HOME").map(PathBuf::from).ok_or_else(|| KopiaError::InvalidConfig {
                reason: format!("HOME is not set and {} / {} were not given", ENV_CONFIG_DIR, ENV_CACHE_DIR),
            })
        };

        let config_dir = match non_empty(&lookup, ENV_CONFIG_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => home()?.join(".config").join("kopia"),
        };
        let cache_dir = match non_empty(&lookup, ENV_CACHE_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => home()?.join(".cache").join("kopia"),
        };

        Ok(Self {
            image: non_empty(&lookup, ENV_IMAGE).unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            config_dir,
            cache_dir,
            command_timeout: timeout_var(&lookup, ENV_COMMAND_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS)?,
            verify_timeout: timeout_var(&lookup, ENV_VERIFY_TIMEOUT_SECS, DEFAULT_VERIFY_TIMEOUT_SECS)?,
            docker_bin: non_empty(&lookup, ENV_DOCKER_BIN)
                .unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_string()),
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e| KopiaError::InvalidConfig {
            reason: format!("{}={:?}: {}", key, raw, e),
        }),
        None => Ok(default),
    }
}

/// `0` disables the timeout.
fn timeout_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Option<Duration>> {
    let secs = parse_var(lookup, key, default)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

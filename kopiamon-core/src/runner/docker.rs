//! Docker bridges for running the tool inside a container.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::{CommandOutput, CommandRunner, KopiaCommand};
use crate::config::{CheckConfig, ExporterConfig};
use crate::error::{KopiaError, Result};

/// Container mount point of the tool's config directory.
const CONTAINER_CONFIG_DIR: &str = "/app/config";

/// Container mount point of the tool's cache directory.
const CONTAINER_CACHE_DIR: &str = "/app/cache";

/// Time limits applied to a child process; `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Timeouts {
    regular: Option<Duration>,
    verify: Option<Duration>,
}

impl Timeouts {
    fn limit_for(&self, command: &KopiaCommand) -> Option<Duration> {
        if command.long_running {
            self.verify
        } else {
            self.regular
        }
    }
}

/// Runs the tool in an already-running container via `docker exec`.
#[derive(Debug, Clone)]
pub struct DockerExecRunner {
    docker_bin: String,
    container: String,
    timeouts: Timeouts,
}

impl DockerExecRunner {
    pub fn new(container: impl Into<String>) -> Self {
        Self { docker_bin: "docker".to_string(), container: container.into(), timeouts: Timeouts::default() }
    }

    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            container: config.container_name.clone(),
            timeouts: Timeouts { regular: config.command_timeout, verify: config.verify_timeout },
        }
    }

    /// Docker argument vector for a tool invocation.
    ///
    /// Mount requests are ignored: the target container already has its volumes.
    pub fn docker_args(&self, command: &KopiaCommand) -> Vec<String> {
        let mut args = vec!["exec".to_string(), self.container.clone(), "kopia".to_string()];
        args.extend(command.tool_args());
        args
    }
}

#[async_trait]
impl CommandRunner for DockerExecRunner {
    #[instrument(skip(self, command), fields(container = %self.container, command = %command))]
    async fn run(&self, command: &KopiaCommand) -> Result<CommandOutput> {
        execute(&self.docker_bin, self.docker_args(command), command, self.timeouts.limit_for(command))
            .await
    }
}

/// Runs the tool in a throwaway `docker run --rm` container with host networking.
#[derive(Debug, Clone)]
pub struct DockerRunRunner {
    docker_bin: String,
    image: String,
    config_dir: PathBuf,
    cache_dir: PathBuf,
    timeouts: Timeouts,
}

impl DockerRunRunner {
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            image: config.image.clone(),
            config_dir: config.config_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            timeouts: Timeouts { regular: config.command_timeout, verify: config.verify_timeout },
        }
    }

    /// Docker argument vector for a tool invocation.
    pub fn docker_args(&self, command: &KopiaCommand) -> Vec<String> {
        let mut args: Vec<String> =
            ["run", "--rm", "--network", "host"].iter().map(|s| s.to_string()).collect();

        if let Some(mount) = &command.read_only_mount {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", mount.host.display(), mount.container.display()));
        }
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.config_dir.display(), CONTAINER_CONFIG_DIR));
        args.push("-v".to_string());
        args.push(format!("{}:{}", self.cache_dir.display(), CONTAINER_CACHE_DIR));

        args.push(self.image.clone());
        args.extend(command.tool_args());
        args
    }
}

#[async_trait]
impl CommandRunner for DockerRunRunner {
    #[instrument(skip(self, command), fields(image = %self.image, command = %command))]
    async fn run(&self, command: &KopiaCommand) -> Result<CommandOutput> {
        execute(&self.docker_bin, self.docker_args(command), command, self.timeouts.limit_for(command))
            .await
    }
}

/// Spawn `program args...`, capture its output, and enforce the optional timeout.
///
/// The child is killed when the timeout fires.
async fn execute(
    program: &str,
    args: Vec<String>,
    command: &KopiaCommand,
    limit: Option<Duration>,
) -> Result<CommandOutput> {
    debug!(program, ?args, "Spawning backup tool");

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| KopiaError::CommandFailed {
            command: command.to_string(),
            reason: format!("failed to launch {}: {}", program, e),
        })?;

    let waited = match limit {
        Some(limit) => timeout(limit, child.wait_with_output()).await.map_err(|_| {
            KopiaError::CommandTimedOut { command: command.to_string(), secs: limit.as_secs() }
        })?,
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|e| KopiaError::CommandFailed {
        command: command.to_string(),
        reason: format!("failed to collect output: {}", e),
    })?;

    debug!(exit_code = ?output.status.code(), stdout_bytes = output.stdout.len(), "Backup tool exited");

    Ok(CommandOutput { stdout: output.stdout, stderr: output.stderr, exit_code: output.status.code() })
}

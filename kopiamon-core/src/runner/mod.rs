//! Backup tool invocation.
//!
//! Every call to the tool goes through the [`CommandRunner`] trait so collection
//! and check logic can be driven by canned output in tests:
//! - [`DockerExecRunner`]: `docker exec` into the long-running tool container
//! - [`DockerRunRunner`]: ephemeral `docker run --rm` with scoped mounts

use crate::error::{KopiaError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

mod docker;

pub use docker::{DockerExecRunner, DockerRunRunner};

/// A single tool invocation, independent of how it is bridged into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KopiaCommand {
    /// Tool arguments, without the `kopia` program name.
    pub args: Vec<String>,
    /// Append `--json` after the arguments.
    pub json: bool,
    /// Host path to expose read-only inside the container.
    pub read_only_mount: Option<VolumeMount>,
    /// Bounded by the verify timeout instead of the regular command timeout.
    pub long_running: bool,
}

/// Bind mount of a host path into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: PathBuf,
}

impl KopiaCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { args: args.into_iter().map(Into::into).collect(), ..Default::default() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    pub fn mount_read_only(mut self, host: impl AsRef<Path>, container: impl AsRef<Path>) -> Self {
        self.read_only_mount = Some(VolumeMount {
            host: host.as_ref().to_path_buf(),
            container: container.as_ref().to_path_buf(),
        });
        self
    }

    /// Full tool argument list as passed after the image/container name.
    pub fn tool_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if self.json {
            args.push("--json".to_string());
        }
        args
    }
}

impl std::fmt::Display for KopiaCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kopia {}", self.tool_args().join(" "))
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs the backup tool and returns its captured output.
///
/// Implementations return `Err` only when the invocation itself failed
/// (could not launch, timed out). A non-zero exit is reported through
/// [`CommandOutput::exit_code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &KopiaCommand) -> Result<CommandOutput>;
}

/// Decode the JSON on stdout of a finished command.
///
/// Output that does not decode is blamed on the invocation when the tool also
/// exited non-zero, otherwise on the payload.
pub fn decode_json<T: DeserializeOwned>(command: &KopiaCommand, output: &CommandOutput) -> Result<T> {
    serde_json::from_slice(&output.stdout).map_err(|source| {
        if output.success() {
            KopiaError::Decode { command: command.to_string(), source }
        } else {
            let stderr = output.stderr_lossy();
            KopiaError::CommandFailed {
                command: command.to_string(),
                reason: match output.exit_code {
                    Some(code) if stderr.is_empty() => format!("exit status {}", code),
                    Some(code) => format!("exit status {}: {}", code, stderr),
                    None => "terminated by signal".to_string(),
                },
            }
        }
    })
}

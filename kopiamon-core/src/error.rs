//! Error types for kopiamon.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use thiserror::Error;

/// Result type alias for kopiamon operations.
pub type Result<T> = std::result::Result<T, KopiaError>;

/// Main error type for kopiamon.
#[derive(Error, Debug)]
pub enum KopiaError {
    // External invocation errors
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Command `{command}` timed out after {secs}s")]
    CommandTimedOut { command: String, secs: u64 },

    // Decode errors
    #[error("Failed to decode output of `{command}`: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid snapshot timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    // Usage errors
    #[error("Unknown check type: {check_type}")]
    UnknownCheckType { check_type: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Metrics exporter errors
    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

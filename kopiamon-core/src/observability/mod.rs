//! Observability infrastructure: tracing and the Prometheus endpoint.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{KopiaError, Result};

pub mod metrics;

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Daemon logging on stdout, default level `info`.
    Stdout,
    /// CLI logging on stderr, default level `warn` (stdout is reserved for the result).
    Stderr,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the default level. Calling this twice is an error.
pub fn init_tracing(target: LogTarget) -> Result<()> {
    let level = match target {
        LogTarget::Stdout => tracing::Level::INFO,
        LogTarget::Stderr => tracing::Level::WARN,
    };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match target {
        LogTarget::Stdout => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
            .try_init(),
        LogTarget::Stderr => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .try_init(),
    };
    installed.map_err(|e| KopiaError::Other(anyhow::anyhow!("tracing init failed: {}", e)))
}

/// Install the global Prometheus recorder with an HTTP listener on `0.0.0.0:<port>`.
///
/// Must be called from within a Tokio runtime. Fails when the port cannot be bound.
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| KopiaError::Metrics(format!("cannot serve metrics on port {}: {}", port, e)))?;

    metrics::register_kopia_metrics();
    tracing::info!(port, "Prometheus metrics endpoint listening");
    Ok(())
}

use kopiamon_core::{
    init_tracing, install_prometheus, Collector, DockerExecRunner, ExporterConfig, LogTarget,
    PrometheusSink,
};
use std::sync::Arc;
use tracing::{error, info};

mod shutdown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize observability FIRST
    init_tracing(LogTarget::Stdout)?;

    let config = match ExporterConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid exporter configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        container = %config.container_name,
        port = config.port,
        interval_secs = config.interval.as_secs(),
        command_timeout_secs = config.command_timeout.map(|t| t.as_secs()),
        verify_timeout_secs = config.verify_timeout.map(|t| t.as_secs()),
        "Starting Kopia exporter"
    );

    // Failing to bind the metrics port is the only fatal runtime condition.
    if let Err(e) = install_prometheus(config.port) {
        error!("{}", e);
        return Err(e.into());
    }

    let runner = Arc::new(DockerExecRunner::from_config(&config));
    let collector = Collector::new(runner, Arc::new(PrometheusSink::new()));

    collector.run(config.interval, shutdown::shutdown_signal()).await;

    info!("Kopia exporter shutting down");
    Ok(())
}

use anyhow::Context;
use kopiamon_core::{init_tracing, CheckConfig, CommandRunner, DockerRunRunner, LogTarget};
use std::process::ExitCode;

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout is reserved for the single result line.
    if let Err(e) = init_tracing(LogTarget::Stderr) {
        eprintln!("{}", e);
    }

    let make_runner = || -> anyhow::Result<Box<dyn CommandRunner>> {
        let config = CheckConfig::from_env().context("Failed to load check configuration")?;
        tracing::debug!(image = %config.image, "Using scoped container runner");
        Ok(Box::new(DockerRunRunner::from_config(&config)))
    };

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    match cli::run(std::env::args_os(), make_runner, &mut stdout, &mut stderr).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("kopia-check: {:#}", e);
            ExitCode::from(cli::EXIT_USAGE)
        }
    }
}

//! Argument handling and output for `kopia-check`.
//!
//! stdout carries exactly one line for the monitoring agent. Usage problems go
//! to stderr with exit code 1; a failed backup is still exit code 0.

use anyhow::Result;
use clap::Parser;
use kopiamon_core::{evaluate_check, CheckResult, CheckType, CommandRunner};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

pub const EXIT_OK: u8 = 0;
pub const EXIT_USAGE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "kopia-check")]
#[command(about = "Check Kopia backups of a volume for a polling monitoring agent", long_about = None)]
#[command(override_usage = "kopia-check [status|validation|last_time] volume_path")]
struct Cli {
    /// What to report: status, validation, or last_time
    check_type: String,

    /// Host path of the backed-up volume
    volume_path: PathBuf,

    /// Monitoring agents may append their own arguments; they are ignored.
    #[arg(hide = true, num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    _rest: Vec<OsString>,
}

/// Run one check and return the process exit code.
///
/// `make_runner` is only called once the arguments are valid; if it fails the
/// check reports `failed` with the error text.
pub async fn run<I, F, O, E>(args: I, make_runner: F, stdout: &mut O, stderr: &mut E) -> Result<u8>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    F: FnOnce() -> Result<Box<dyn CommandRunner>>,
    O: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            write!(stderr, "{}", e)?;
            return Ok(EXIT_USAGE);
        }
        Err(e) => {
            // --help / --version
            write!(stdout, "{}", e)?;
            return Ok(EXIT_OK);
        }
    };

    let check_type: CheckType = match cli.check_type.parse() {
        Ok(check_type) => check_type,
        Err(e) => {
            writeln!(stderr, "{}", e)?;
            return Ok(EXIT_USAGE);
        }
    };

    let result = match make_runner() {
        Ok(runner) => evaluate_check(runner.as_ref(), &cli.volume_path).await,
        Err(e) => CheckResult::failed(format!("{:#}", e)),
    };

    writeln!(stdout, "{}", result.render(check_type))?;
    Ok(EXIT_OK)
}

//! CLI entry point for the boxfit training pipeline.
//!
//! Parses arguments with clap, executes the selected command, renders the
//! summary to stdout, and maps failures to exit codes. Logging is initialised
//! eagerly so every later stage can emit structured diagnostics via
//! `tracing`.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use boxfit_cli::{
    cli::{Cli, CliError, render_summary, run_cli},
    logging::{self, LoggingError},
};
use tracing::{error, field};

/// Parse CLI arguments, execute the command, render the summary, and flush
/// the output stream.
fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let summary = run_cli(cli).context("failed to execute command")?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_summary(&summary, &mut writer).context("failed to render summary")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = try_main() {
        let (code, detail_code) = err
            .downcast_ref::<CliError>()
            .map_or((None, None), |cli_error| {
                (cli_error.code(), cli_error.detail_code())
            });
        let code_field = code.map(field::display);
        let detail_code_field = detail_code.map(field::display);

        error!(
            error = %err,
            code = code_field,
            detail_code = detail_code_field,
            "command execution failed"
        );
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn report_logging_init_error(err: &LoggingError) {
    // Logging is not installed yet, so stderr is the only channel left.
    eprintln!("failed to initialise logging: {err}");
}

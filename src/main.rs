// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, build the context from the
//   environment and hand both to `cli::run`.
// - Every `BwmError` becomes one labelled line on stderr plus the exit code
//   of its class.

use bingwm_cli::cli::{self, Cli, Context};
use bingwm_cli::logging::init_logging;
use bingwm_cli::BwmError;
use clap::Parser;
use crossterm::style::Stylize;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing::debug;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let result = Context::from_env().and_then(|ctx| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        cli::run(cli, &ctx, &mut out)
    });

    match result {
        Ok(outcome) => Ok(ExitCode::from(outcome.exit_code())),
        Err(err) => {
            debug!(error = ?err, "command failed");
            report(&err);
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}

fn report(err: &BwmError) {
    let label = match err {
        BwmError::NotAuthenticated | BwmError::Auth { .. } => "Auth error:",
        BwmError::Validation(_) | BwmError::Config(_) | BwmError::Io(_) => "Error:",
        _ => "API error:",
    };
    if io::stderr().is_terminal() {
        eprintln!("{} {err}", label.red().bold());
    } else {
        eprintln!("{label} {err}");
    }
}

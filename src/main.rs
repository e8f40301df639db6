//! Bakery: shared/exclusive file locks for scripts.
//!
//! This is the main entry point for the `bakery` CLI. It parses arguments,
//! sets up logging, dispatches to the appropriate command handler, and
//! handles errors with proper exit codes.

mod cli;
mod commands;

use bakery::exit_codes;
use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let code = match commands::dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    };

    ExitCode::from(u8::try_from(code).unwrap_or(exit_codes::USER_ERROR as u8))
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bakery={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

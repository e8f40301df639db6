//! Command implementations for bakery.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command runs as the current process on the
//! current host.

mod clean;
mod list;
mod run;

use bakery::config::LockConfig;
use bakery::error::Result;
use bakery::exit_codes;
use bakery::host::HostIdentity;
use bakery::locks::LockManager;
use crate::cli::{Cli, Command};
use std::path::Path;
use tracing::debug;

/// Dispatch a command to its implementation.
///
/// Returns the process exit code for commands that completed; errors are
/// mapped to exit codes by the caller.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => run::cmd_run(config, args),
        Command::List(args) => list::cmd_list(config, args).map(|()| exit_codes::SUCCESS),
        Command::Clean(args) => clean::cmd_clean(config, args).map(|()| exit_codes::SUCCESS),
        Command::Clear(args) => clean::cmd_clear(config, args).map(|()| exit_codes::SUCCESS),
    }
}

/// Load `--config` if given, otherwise use defaults.
fn load_config(path: Option<&Path>) -> Result<LockConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading lock config");
            LockConfig::load(path)
        }
        None => Ok(LockConfig::default()),
    }
}

/// Manager acting as this process on this host.
fn lock_manager(config: LockConfig) -> Result<LockManager> {
    LockManager::new(config, HostIdentity::current())
}

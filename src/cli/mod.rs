//! CLI argument parsing for bakery.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Bakery: shared/exclusive file locks that work across processes and hosts.
///
/// Locking a resource creates `<resource>.lck/` next to it. Every locker
/// publishes a small member file there and waits for earlier, incompatible
/// members to leave.
#[derive(Parser, Debug)]
#[command(name = "bakery")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Lock configuration file (YAML). Defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for bakery.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command while holding a lock.
    ///
    /// Exits with the command's exit code, or 4 if the lock stayed busy.
    Run(RunArgs),

    /// List the members of a lock directory.
    ///
    /// Shows every member file with its ticket, owner and age. Read-only.
    List(ListArgs),

    /// Remove corrupt, stale and foreign entries from a lock directory.
    Clean(CleanArgs),

    /// Remove a lock directory and everything in it.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(ClearArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Resource to lock.
    pub path: PathBuf,

    /// Take a shared lock instead of an exclusive one.
    #[arg(long)]
    pub shared: bool,

    /// Give up after waiting this many milliseconds (0 = try once).
    #[arg(long, value_name = "MS", conflicts_with = "no_wait")]
    pub wait_ms: Option<u64>,

    /// Fail immediately if the lock is held.
    #[arg(long)]
    pub no_wait: bool,

    /// Free-form text stored in the member file.
    #[arg(long, default_value = "")]
    pub payload: String,

    /// Command and arguments to run.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Wait budget in milliseconds; `None` waits forever.
    pub fn wait_millis(&self) -> Option<u64> {
        if self.no_wait { Some(0) } else { self.wait_ms }
    }
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Locked resource (not the `.lck` directory).
    pub path: PathBuf,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `clean` command.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Locked resource (not the `.lck` directory).
    pub path: PathBuf,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Locked resource (not the `.lck` directory).
    pub path: PathBuf,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

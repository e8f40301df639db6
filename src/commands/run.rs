//! Implementation of the `bakery run` command.

use bakery::config::LockConfig;
use bakery::error::{BakeryError, Result};
use bakery::exit_codes;
use bakery::locks::{LockKind, WaitPolicy};
use crate::cli::RunArgs;
use std::process::{Command, ExitStatus};
use tracing::debug;

/// Hold the lock for the lifetime of the child and pass on its exit code.
pub(super) fn cmd_run(config: LockConfig, args: RunArgs) -> Result<i32> {
    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| BakeryError::User("no command given".to_string()))?;

    let manager = super::lock_manager(config)?;
    let kind = if args.shared {
        LockKind::Shared
    } else {
        LockKind::Exclusive
    };
    let wait = WaitPolicy::from_millis(args.wait_millis());

    let Some(guard) = manager.acquire_guard(&args.path, kind, wait, &args.payload)? else {
        eprintln!("Lock busy: {}", args.path.display());
        return Ok(exit_codes::LOCK_FAILURE);
    };
    debug!(program = %program, %kind, "running command under lock");

    let status = Command::new(program)
        .args(program_args)
        .status()
        .map_err(|e| BakeryError::ChildFailed(format!("{}: {}", program, e)))?;

    guard.release()?;
    Ok(exit_code_of(status))
}

/// The child's exit code; signals map to `128 + signo` like a shell.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    exit_codes::USER_ERROR
}

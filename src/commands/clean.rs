//! Implementation of the `bakery clean` and `bakery clear` commands.
//!
//! `clean` only removes what no live locker can still need: foreign files,
//! corrupt member files, member files of dead processes on this host and
//! abandoned entry directories. `clear` removes the whole lock directory and
//! is only safe once every holder is known to be gone.

use bakery::config::LockConfig;
use bakery::error::{BakeryError, Result};
use bakery::locks;
use crate::cli::{CleanArgs, ClearArgs};

pub(super) fn cmd_clean(config: LockConfig, args: CleanArgs) -> Result<()> {
    let manager = super::lock_manager(config)?;
    let report = locks::purge(&manager, &args.path)?;

    println!("Cleaned: {}", report.lock_dir.display());
    println!("  Removed entries:  {}", report.removed_entries);
    println!("  Live members:     {}", report.live_members);
    if report.removed_directory {
        println!("  Lock directory removed (empty).");
    }

    Ok(())
}

pub(super) fn cmd_clear(config: LockConfig, args: ClearArgs) -> Result<()> {
    // Require --force flag
    if !args.force {
        return Err(BakeryError::User(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock breaks mutual exclusion if a holder is still active.\n\
             Only clear locks if you are certain every holder has exited.\n\n\
             To clear the lock, run:\n  bakery clear {} --force",
            args.path.display()
        )));
    }

    let manager = super::lock_manager(config)?;
    let removed = locks::clear_all(&manager, &args.path)?;

    if removed == 0 {
        println!("No lock directory entries for {}", args.path.display());
    } else {
        println!("Cleared {} entries for {}", removed, args.path.display());
    }

    Ok(())
}

//! Admission: reserving a member number inside the lock directory.
//!
//! A number is reserved by creating its entry directory `Dnnnnn.lck`, which
//! `mkdir` makes exclusive. The reservation only counts if no member file
//! `Mnnnnn.lck` already uses the same number. The lock directory itself is
//! created on demand and may vanish under us when the last holder leaves;
//! both cases restart the attempt.

use super::cleanup::CleanupStack;
use super::context::LockContext;
use super::naming::EntryPaths;
use crate::error::{BakeryError, Result};
use crate::fs::{FileKind, delete_entry, is_already_exists, is_not_found};
use std::path::Path;
use tracing::{debug, warn};

/// A reserved number. Dropping it removes the entry directory again.
pub(crate) struct Reservation<'a> {
    pub paths: EntryPaths,
    pub cleanup: CleanupStack<'a>,
}

/// Reserve a free number in `lock_dir`, drawing candidates from `next_candidate`.
pub(crate) fn reserve<'a>(
    ctx: &LockContext<'a>,
    lock_dir: &Path,
    mut next_candidate: impl FnMut() -> u16,
) -> Result<Reservation<'a>> {
    let attempts = ctx.config.max_admission_attempts;

    for attempt in 1..=attempts {
        ensure_lock_directory(ctx, lock_dir)?;

        let paths = EntryPaths::new(lock_dir, next_candidate());
        match ctx.fs.create_directory(&paths.entry_directory) {
            Ok(()) => {}
            Err(e) if is_already_exists(&e) => {
                debug!(number = paths.number, attempt, "entry number taken, retrying");
                continue;
            }
            // The lock directory was removed between the stat and the mkdir.
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(BakeryError::io("create entry directory", &paths.entry_directory, e)),
        }

        let mut cleanup = CleanupStack::new(ctx.fs);
        cleanup.push_directory(&paths.entry_directory);

        match ctx.fs.file_kind(&paths.member_file) {
            Ok(FileKind::NotFound) => {
                debug!(
                    lock_dir = %lock_dir.display(),
                    number = paths.number,
                    attempt,
                    "reserved entry number"
                );
                return Ok(Reservation { paths, cleanup });
            }
            Ok(_) => {
                debug!(number = paths.number, attempt, "member number in use, retrying");
                // Dropping the cleanup stack removes our entry directory.
                continue;
            }
            Err(e) => return Err(BakeryError::io("stat", &paths.member_file, e)),
        }
    }

    Err(BakeryError::SlotExhausted { attempts })
}

/// Make sure `lock_dir` is a directory, creating it if needed.
fn ensure_lock_directory(ctx: &LockContext<'_>, lock_dir: &Path) -> Result<()> {
    loop {
        let kind = ctx
            .fs
            .file_kind(lock_dir)
            .map_err(|e| BakeryError::io("stat", lock_dir, e))?;

        match kind {
            FileKind::Directory => return Ok(()),
            FileKind::File => {
                return Err(BakeryError::TryAgain(format!(
                    "'{}' is a file, not a lock directory",
                    lock_dir.display()
                )));
            }
            FileKind::Other => {
                warn!(path = %lock_dir.display(), "removing unexpected object at lock directory path");
                delete_entry(ctx.fs, lock_dir)
                    .map_err(|e| BakeryError::io("remove", lock_dir, e))?;
            }
            FileKind::NotFound => match ctx.fs.create_directory(lock_dir) {
                Ok(()) => {
                    debug!(lock_dir = %lock_dir.display(), "created lock directory");
                    return Ok(());
                }
                Err(e) if is_already_exists(&e) => return Ok(()),
                Err(e) => return Err(BakeryError::io("create lock directory", lock_dir, e)),
            },
        }
    }
}

//! Write-then-rename publication.
//!
//! Member files must never be observed half written. Content is written to a
//! staging path, synced, closed, and only then renamed onto its final name,
//! which is atomic as long as both paths are on the same filesystem.
//!
//! On failure the staging file is removed; the target is never touched.

use super::{FileHandle, FileSystem, delete_file_if_present};
use crate::error::{BakeryError, Result};
use std::io::Write;
use std::path::Path;

/// Publish `content` at `target` by way of the exclusive staging file `staging`.
///
/// # Returns
///
/// * `Ok(())` - `target` now holds exactly `content`
/// * `Err(BakeryError::Io)` - On create, write, sync or rename failure
pub fn write_then_rename(
    fs: &dyn FileSystem,
    staging: &Path,
    target: &Path,
    content: &[u8],
) -> Result<()> {
    write_and_sync(fs, staging, content)?;

    fs.rename(staging, target).map_err(|e| {
        // Clean up staging file on error
        let _ = delete_file_if_present(fs, staging);
        BakeryError::io("rename", staging, e)
    })
}

/// Create `path` exclusively, write all of `content` and sync it to disk.
fn write_and_sync(fs: &dyn FileSystem, path: &Path, content: &[u8]) -> Result<()> {
    let mut file: Box<dyn FileHandle> = fs
        .create_new(path)
        .map_err(|e| BakeryError::io("create", path, e))?;

    let result = file.write_all(content).and_then(|()| file.sync_all());
    // Close before any cleanup so removal works on every platform.
    drop(file);

    result.map_err(|e| {
        let _ = delete_file_if_present(fs, path);
        BakeryError::io("write", path, e)
    })
}

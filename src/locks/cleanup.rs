//! Scoped cleanup of partially created lock state.
//!
//! Each filesystem artifact created while acquiring a lock is pushed onto a
//! `CleanupStack`. If acquisition bails out at any point, dropping the stack
//! removes the artifacts newest first. Once the lock is held the stack is
//! disarmed and the artifacts stay.

use crate::fs::{FileSystem, is_not_found};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Artifact {
    File(PathBuf),
    Directory(PathBuf),
}

impl Artifact {
    fn path(&self) -> &Path {
        match self {
            Artifact::File(path) | Artifact::Directory(path) => path,
        }
    }
}

/// Undo list for created files and directories.
pub(crate) struct CleanupStack<'a> {
    fs: &'a dyn FileSystem,
    artifacts: Vec<Artifact>,
}

impl<'a> CleanupStack<'a> {
    pub(crate) fn new(fs: &'a dyn FileSystem) -> Self {
        Self {
            fs,
            artifacts: Vec::new(),
        }
    }

    /// Register a file to delete on unwind.
    pub(crate) fn push_file(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(Artifact::File(path.into()));
    }

    /// Register a directory to remove on unwind.
    pub(crate) fn push_directory(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(Artifact::Directory(path.into()));
    }

    /// Stop tracking `path`, e.g. after it was renamed or removed on purpose.
    pub(crate) fn forget(&mut self, path: &Path) {
        self.artifacts.retain(|artifact| artifact.path() != path);
    }

    /// Keep everything that was created.
    pub(crate) fn disarm(&mut self) {
        self.artifacts.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.artifacts.len()
    }
}

impl Drop for CleanupStack<'_> {
    fn drop(&mut self) {
        while let Some(artifact) = self.artifacts.pop() {
            let result = match &artifact {
                Artifact::File(path) => self.fs.delete_file(path),
                Artifact::Directory(path) => self.fs.delete_directory(path),
            };
            if let Err(e) = result
                && !is_not_found(&e)
            {
                warn!(
                    path = %artifact.path().display(),
                    error = %e,
                    "failed to clean up lock artifact"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFileSystem;
    use tempfile::TempDir;

    #[test]
    fn drop_unwinds_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("D00001.lck");
        let file = dir.join("E00001.lck");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(&file, b"x").unwrap();

        {
            let mut cleanup = CleanupStack::new(&StdFileSystem);
            cleanup.push_directory(&dir);
            cleanup.push_file(&file);
        }

        // The directory could only be removed because the file went first.
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn disarm_keeps_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("M00001.lck");
        std::fs::write(&file, b"x").unwrap();

        {
            let mut cleanup = CleanupStack::new(&StdFileSystem);
            cleanup.push_file(&file);
            cleanup.disarm();
        }

        assert!(file.exists());
    }

    #[test]
    fn forget_drops_single_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let keep = temp_dir.path().join("M00001.lck");
        let remove = temp_dir.path().join("M00002.lck");
        std::fs::write(&keep, b"x").unwrap();
        std::fs::write(&remove, b"x").unwrap();

        {
            let mut cleanup = CleanupStack::new(&StdFileSystem);
            cleanup.push_file(&keep);
            cleanup.push_file(&remove);
            cleanup.forget(&keep);
            assert_eq!(cleanup.len(), 1);
        }

        assert!(keep.exists());
        assert!(!remove.exists());
    }

    #[test]
    fn missing_artifacts_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let mut cleanup = CleanupStack::new(&StdFileSystem);
        cleanup.push_file(temp_dir.path().join("gone"));
        cleanup.push_directory(temp_dir.path().join("gone-dir"));
        drop(cleanup);
    }
}

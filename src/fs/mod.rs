//! Filesystem primitives used by the lock protocol.
//!
//! The Bakery algorithm is written only against [`FileSystem`], so the same
//! code runs on every target; [`StdFileSystem`] adapts `std::fs`. Errors are
//! plain `io::Error`s and the protocol inspects their [`io::ErrorKind`]
//! (`NotFound`, `AlreadyExists`, `PermissionDenied`, ...) the way POSIX code
//! inspects `errno`.

pub mod atomic;
mod std_fs;

pub use atomic::write_then_rename;
pub use std_fs::StdFileSystem;

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::SystemTime;

/// What occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Nothing exists at the path.
    NotFound,
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else (symlink, socket, device, ...).
    Other,
}

/// An open file. Dropping the handle closes it.
pub trait FileHandle: Read + Write + Send {
    /// Current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Flush data and metadata to stable storage.
    fn sync_all(&self) -> io::Result<()>;
}

/// The filesystem operations the lock protocol needs.
///
/// Every method must be individually atomic at the OS level. In particular
/// `create_directory` must fail with `AlreadyExists` when the directory is
/// already there, and `delete_directory` must refuse non-empty directories.
pub trait FileSystem: Send + Sync {
    /// Classify the path without following symlinks. A missing path is not an error.
    fn file_kind(&self, path: &Path) -> io::Result<FileKind>;

    /// Create a single directory; `AlreadyExists` if it is present.
    fn create_directory(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory.
    fn delete_directory(&self, path: &Path) -> io::Result<()>;

    /// Exclusively create a new file for writing.
    fn create_new(&self, path: &Path) -> io::Result<Box<dyn FileHandle>>;

    /// Open an existing file for reading.
    fn open_read_only(&self, path: &Path) -> io::Result<Box<dyn FileHandle>>;

    /// Atomically rename `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file.
    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Names (not paths) of the entries in a directory.
    fn list_directory(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Last modification time, used for diagnostics only.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Whether the error means "nothing there".
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Whether the error means "someone else created it first".
pub fn is_already_exists(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AlreadyExists
}

/// Remove a file, treating an already-missing file as success.
pub fn delete_file_if_present(fs: &dyn FileSystem, path: &Path) -> io::Result<()> {
    match fs.delete_file(path) {
        Err(e) if !is_not_found(&e) => Err(e),
        _ => Ok(()),
    }
}

/// Remove whatever occupies `path`: files are deleted, directories are
/// emptied one level deep and removed. Missing paths are success.
pub fn delete_entry(fs: &dyn FileSystem, path: &Path) -> io::Result<()> {
    match fs.file_kind(path)? {
        FileKind::NotFound => Ok(()),
        FileKind::Directory => {
            match fs.list_directory(path) {
                Ok(names) => {
                    for name in names {
                        delete_file_if_present(fs, &path.join(name))?;
                    }
                }
                Err(e) if is_not_found(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
            match fs.delete_directory(path) {
                Err(e) if !is_not_found(&e) => Err(e),
                _ => Ok(()),
            }
        }
        FileKind::File | FileKind::Other => delete_file_if_present(fs, path),
    }
}

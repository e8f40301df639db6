//! Lock directory layout.
//!
//! For a resource `/data/disk.img` the lock directory is `/data/disk.img.lck`.
//! Inside it live member files `M01234.lck`, transient entry directories
//! `D01234.lck`, and within each entry directory its staging file
//! `E01234.lck`. Anything else in the lock directory is debris.

use crate::error::{BakeryError, Result};
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Suffix shared by the lock directory and every entry name.
pub const LOCK_SUFFIX: &str = ".lck";

/// Length of the longest tail appended below the lock directory: `/D01234.lck/E01234.lck`.
const ENTRY_TAIL_LEN: usize = 2 * (1 + 1 + 5 + LOCK_SUFFIX.len());

/// Valid entry names: a kind letter, exactly five ASCII digits, the suffix.
static ENTRY_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[MDE][0-9]{5}\.lck$").expect("Invalid entry name regex"));

/// The kinds of entries the protocol creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Published member file (`M`).
    Member,
    /// Entry directory reserving a number during admission (`D`).
    EntryDirectory,
    /// Staging file inside an entry directory (`E`).
    EntryFile,
}

impl EntryKind {
    /// The leading letter of names of this kind.
    pub fn prefix(&self) -> char {
        match self {
            EntryKind::Member => 'M',
            EntryKind::EntryDirectory => 'D',
            EntryKind::EntryFile => 'E',
        }
    }
}

/// `resource` + `.lck`.
pub fn lock_directory_path(resource: &Path) -> PathBuf {
    let mut name = OsString::from(resource.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Name of an entry of the given kind and number, e.g. `M00042.lck`.
pub fn entry_name(kind: EntryKind, number: u16) -> String {
    format!("{}{:05}{}", kind.prefix(), number, LOCK_SUFFIX)
}

/// Whether `name` is something the protocol could have created.
pub fn is_valid_entry_name(name: &str) -> bool {
    ENTRY_NAME_REGEX.is_match(name)
}

/// Classify a lock directory entry; `None` means debris.
pub fn classify(name: &str) -> Option<EntryKind> {
    if !is_valid_entry_name(name) {
        return None;
    }
    match name.as_bytes()[0] {
        b'M' => Some(EntryKind::Member),
        b'D' => Some(EntryKind::EntryDirectory),
        _ => Some(EntryKind::EntryFile),
    }
}

/// Fail fast when the deepest path the protocol builds for `resource` would
/// exceed `limit` bytes.
pub fn check_path_budget(resource: &Path, limit: usize) -> Result<()> {
    let needed = resource.as_os_str().len() + LOCK_SUFFIX.len() + ENTRY_TAIL_LEN;
    if needed > limit {
        return Err(BakeryError::NameTooLong {
            path: resource.to_path_buf(),
            limit,
        });
    }
    Ok(())
}

/// All paths belonging to one reserved number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    /// The reserved number.
    pub number: u16,
    /// `Mnnnnn.lck`, the member name used for ordering ties.
    pub member_name: String,
    /// `<lockdir>/Mnnnnn.lck`.
    pub member_file: PathBuf,
    /// `<lockdir>/Dnnnnn.lck`.
    pub entry_directory: PathBuf,
    /// `<lockdir>/Dnnnnn.lck/Ennnnn.lck`.
    pub entry_file: PathBuf,
}

impl EntryPaths {
    /// Compute the member, entry directory and staging paths for `number`.
    pub fn new(lock_dir: &Path, number: u16) -> Self {
        let member_name = entry_name(EntryKind::Member, number);
        let entry_directory = lock_dir.join(entry_name(EntryKind::EntryDirectory, number));
        let entry_file = entry_directory.join(entry_name(EntryKind::EntryFile, number));
        Self {
            number,
            member_file: lock_dir.join(&member_name),
            member_name,
            entry_directory,
            entry_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_directory_appends_suffix() {
        assert_eq!(
            lock_directory_path(Path::new("/data/disk.img")),
            PathBuf::from("/data/disk.img.lck")
        );
        assert_eq!(
            lock_directory_path(Path::new("relative")),
            PathBuf::from("relative.lck")
        );
    }

    #[test]
    fn entry_names_are_zero_padded() {
        assert_eq!(entry_name(EntryKind::Member, 42), "M00042.lck");
        assert_eq!(entry_name(EntryKind::EntryDirectory, 0), "D00000.lck");
        assert_eq!(entry_name(EntryKind::EntryFile, 65535), "E65535.lck");
    }

    #[test]
    fn validator_accepts_protocol_names() {
        assert!(is_valid_entry_name("M00042.lck"));
        assert!(is_valid_entry_name("D12345.lck"));
        assert!(is_valid_entry_name("E99999.lck"));
    }

    #[test]
    fn validator_rejects_debris() {
        for name in [
            "X00042.lck",
            "M0042.lck",
            "M000042.lck",
            "M00042.lock",
            "M00042.lck.tmp",
            "m00042.lck",
            "M0004a.lck",
            "M０００４２.lck",
            "junk.txt",
            "",
        ] {
            assert!(!is_valid_entry_name(name), "{} should be debris", name);
        }
    }

    #[test]
    fn classify_by_prefix() {
        assert_eq!(classify("M00001.lck"), Some(EntryKind::Member));
        assert_eq!(classify("D00001.lck"), Some(EntryKind::EntryDirectory));
        assert_eq!(classify("E00001.lck"), Some(EntryKind::EntryFile));
        assert_eq!(classify("Z00001.lck"), None);
    }

    #[test]
    fn entry_paths_layout() {
        let paths = EntryPaths::new(Path::new("/data/disk.img.lck"), 7);
        assert_eq!(paths.member_name, "M00007.lck");
        assert_eq!(paths.member_file, PathBuf::from("/data/disk.img.lck/M00007.lck"));
        assert_eq!(
            paths.entry_directory,
            PathBuf::from("/data/disk.img.lck/D00007.lck")
        );
        assert_eq!(
            paths.entry_file,
            PathBuf::from("/data/disk.img.lck/D00007.lck/E00007.lck")
        );
    }

    #[test]
    fn path_budget_counts_deepest_entry() {
        let resource = Path::new("/r");
        // "/r" + ".lck" + "/D00000.lck/E00000.lck"
        let needed = 2 + 4 + 22;
        assert!(check_path_budget(resource, needed).is_ok());
        let err = check_path_budget(resource, needed - 1).unwrap_err();
        assert!(matches!(err, BakeryError::NameTooLong { limit, .. } if limit == needed - 1));
    }
}

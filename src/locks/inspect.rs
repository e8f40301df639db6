//! Lock directory listing, purging, and clearing.
//!
//! These operate outside the lock protocol. `list_members` only reads,
//! `purge` removes what no live locker could still need, and `clear_all`
//! removes everything; the caller is responsible for checking that nobody
//! holds the lock before clearing it.

use super::manager::LockManager;
use super::member::{MemberRead, MemberRecord, read_member_file};
use super::naming::{self, EntryKind};
use super::scanner::{Scanner, Visit};
use crate::error::{BakeryError, Result};
use crate::fs::{FileKind, delete_entry, is_not_found};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// One member file as found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    /// File name, e.g. `M01234.lck`.
    pub name: String,

    /// Parsed contents; `None` if the file is corrupt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<MemberRecord>,

    /// Why the file could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,

    /// Last modification time of the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    /// Written by this machine.
    pub same_host: bool,

    /// Written by this machine by an execution that no longer exists.
    pub stale: bool,
}

impl MemberInfo {
    /// Time since the member file was last written.
    pub fn age(&self) -> Option<Duration> {
        self.modified
            .map(|modified| Utc::now().signed_duration_since(modified))
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let Some(age) = self.age() else {
            return "?".to_string();
        };
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            format!("{}s", seconds.max(0))
        }
    }
}

impl fmt::Display for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.record, &self.problem) {
            (Some(record), _) => write!(
                f,
                "{} {} #{} (owner: {}/{}, age: {}{})",
                self.name,
                record.kind,
                record.lamport_number,
                record.machine_id,
                record.execution_id,
                self.age_string(),
                if self.stale { ", STALE" } else { "" }
            ),
            (None, problem) => write!(
                f,
                "{} CORRUPT ({})",
                self.name,
                problem.as_deref().unwrap_or("unreadable")
            ),
        }
    }
}

/// Everything found in one lock directory.
#[derive(Debug, Clone, Serialize)]
pub struct LockDirectoryReport {
    pub lock_dir: PathBuf,
    pub exists: bool,
    pub members: Vec<MemberInfo>,
    /// Entry directories of admissions in progress (or abandoned).
    pub pending_entries: Vec<String>,
    /// Names the protocol never creates.
    pub debris: Vec<String>,
}

/// Outcome of a purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub lock_dir: PathBuf,
    /// Members that survived the purge.
    pub live_members: usize,
    /// Entries removed by the purge.
    pub removed_entries: usize,
    /// The lock directory ended up empty and was removed.
    pub removed_directory: bool,
}

/// Describe the lock directory of `resource` without changing anything.
pub fn list_members(manager: &LockManager, resource: &Path) -> Result<LockDirectoryReport> {
    let lock_dir = manager.lock_directory(resource)?;
    let ctx = manager.context();

    let mut report = LockDirectoryReport {
        lock_dir: lock_dir.clone(),
        exists: false,
        members: Vec::new(),
        pending_entries: Vec::new(),
        debris: Vec::new(),
    };

    let mut names = match ctx.fs.list_directory(&lock_dir) {
        Ok(names) => names,
        Err(e) if is_not_found(&e) => return Ok(report),
        Err(e) => return Err(BakeryError::io("list", &lock_dir, e)),
    };
    names.sort();
    report.exists = true;

    for name in names {
        match naming::classify(&name) {
            Some(EntryKind::Member) => {}
            Some(EntryKind::EntryDirectory) => {
                report.pending_entries.push(name);
                continue;
            }
            Some(EntryKind::EntryFile) | None => {
                report.debris.push(name);
                continue;
            }
        }

        let path = lock_dir.join(&name);
        let (record, problem) = match read_member_file(ctx.fs, &path, ctx.config.member_file_size)? {
            MemberRead::Missing => continue,
            MemberRead::Corrupt(reason) => (None, Some(reason.to_string())),
            MemberRead::Valid(record) => (Some(record), None),
        };
        let same_host = record
            .as_ref()
            .is_some_and(|r| ctx.is_local_machine(&r.machine_id));
        let stale = same_host
            && record
                .as_ref()
                .is_some_and(|r| !ctx.owner_check.is_valid_owner(&r.execution_id, &r.payload));
        let modified = ctx.fs.modified(&path).ok().map(DateTime::<Utc>::from);

        report.members.push(MemberInfo {
            name,
            record,
            problem,
            modified,
            same_host,
            stale,
        });
    }

    Ok(report)
}

/// Remove debris, corrupt members, members of dead local owners and
/// abandoned entry directories, then the lock directory if it is empty.
pub fn purge(manager: &LockManager, resource: &Path) -> Result<PurgeReport> {
    let lock_dir = manager.lock_directory(resource)?;
    let ctx = manager.context();

    let before = count_entries(manager, &lock_dir)?;
    let mut live_members = 0;
    Scanner::new(ctx, &lock_dir, true).scan(|_| {
        live_members += 1;
        Ok(Visit::Continue)
    })?;
    let after = count_entries(manager, &lock_dir)?;

    manager.remove_lock_directory(&lock_dir);
    let removed_directory = before.is_some()
        && matches!(ctx.fs.file_kind(&lock_dir), Ok(FileKind::NotFound));

    let report = PurgeReport {
        removed_entries: before.unwrap_or(0).saturating_sub(after.unwrap_or(0)),
        lock_dir,
        live_members,
        removed_directory,
    };
    info!(
        lock_dir = %report.lock_dir.display(),
        removed = report.removed_entries,
        live = report.live_members,
        "purged lock directory"
    );
    Ok(report)
}

/// Remove every entry of the lock directory and the directory itself.
///
/// Returns the number of entries removed.
pub fn clear_all(manager: &LockManager, resource: &Path) -> Result<usize> {
    let lock_dir = manager.lock_directory(resource)?;
    let fs = manager.file_system();

    let names = match fs.list_directory(&lock_dir) {
        Ok(names) => names,
        Err(e) if is_not_found(&e) => return Ok(0),
        Err(e) => return Err(BakeryError::io("list", &lock_dir, e)),
    };

    for name in &names {
        let path = lock_dir.join(name);
        delete_entry(fs, &path).map_err(|e| BakeryError::io("remove", &path, e))?;
    }
    match fs.delete_directory(&lock_dir) {
        Err(e) if !is_not_found(&e) => {
            return Err(BakeryError::io("remove lock directory", &lock_dir, e));
        }
        _ => {}
    }

    info!(lock_dir = %lock_dir.display(), removed = names.len(), "cleared lock directory");
    Ok(names.len())
}

fn count_entries(manager: &LockManager, lock_dir: &Path) -> Result<Option<usize>> {
    match manager.file_system().list_directory(lock_dir) {
        Ok(names) => Ok(Some(names.len())),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(BakeryError::io("list", lock_dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::member::LockKind;
    use crate::test_support::TestBed;

    #[test]
    fn list_missing_directory() {
        let bed = TestBed::new();
        let report = list_members(&bed.manager(), &bed.resource).unwrap();

        assert!(!report.exists);
        assert!(report.members.is_empty());
    }

    #[test]
    fn list_reports_without_mutating() {
        let bed = TestBed::new();
        bed.owner_check.kill("66");
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00001.lck", "remote-host", "5", 3, LockKind::Shared);
        bed.write_member("M00002.lck", &bed.identity.machine_id, "66", 4, LockKind::Exclusive);
        std::fs::write(lock_dir.join("M00003.lck"), b"torn").unwrap();
        std::fs::create_dir(lock_dir.join("D00004.lck")).unwrap();
        std::fs::write(lock_dir.join("stray"), b"x").unwrap();
        let before = bed.entry_names();

        let report = list_members(&bed.manager(), &bed.resource).unwrap();

        assert!(report.exists);
        assert_eq!(report.members.len(), 3);
        assert!(!report.members[0].same_host);
        assert!(report.members[1].same_host && report.members[1].stale);
        assert!(report.members[2].record.is_none());
        assert!(report.members[2].problem.is_some());
        assert_eq!(report.pending_entries, vec!["D00004.lck"]);
        assert_eq!(report.debris, vec!["stray"]);
        assert_eq!(bed.entry_names(), before);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"lamport_number\":3"));
    }

    #[test]
    fn member_display() {
        let info = MemberInfo {
            name: "M00001.lck".to_string(),
            record: Some(MemberRecord {
                machine_id: "host".to_string(),
                execution_id: "12".to_string(),
                lamport_number: 7,
                kind: LockKind::Exclusive,
                payload: String::new(),
            }),
            problem: None,
            modified: Some(Utc::now() - Duration::minutes(90)),
            same_host: true,
            stale: true,
        };
        assert_eq!(
            info.to_string(),
            "M00001.lck EXCLUSIVE #7 (owner: host/12, age: 1h 30m, STALE)"
        );
    }

    #[test]
    fn purge_removes_stale_state_and_empty_directory() {
        let bed = TestBed::new();
        bed.owner_check.kill("66");
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00002.lck", &bed.identity.machine_id, "66", 4, LockKind::Exclusive);
        std::fs::write(lock_dir.join("M00003.lck"), b"torn").unwrap();
        std::fs::write(lock_dir.join("stray"), b"x").unwrap();

        let report = purge(&bed.manager(), &bed.resource).unwrap();

        assert_eq!(report.live_members, 0);
        assert_eq!(report.removed_entries, 3);
        assert!(report.removed_directory);
        assert!(!lock_dir.exists());
    }

    #[test]
    fn stray_entry_file_is_listed_as_debris_and_purged() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        std::fs::write(lock_dir.join("E00004.lck"), b"orphan").unwrap();
        let manager = bed.manager();

        let listed = list_members(&manager, &bed.resource).unwrap();
        assert_eq!(listed.debris, vec!["E00004.lck"]);

        let report = purge(&manager, &bed.resource).unwrap();
        assert_eq!(report.removed_entries, 1);
        assert!(report.removed_directory);
        assert!(!lock_dir.exists());
    }

    #[test]
    fn purge_keeps_live_members() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00001.lck", "remote-host", "5", 3, LockKind::Shared);

        let report = purge(&bed.manager(), &bed.resource).unwrap();

        assert_eq!(report.live_members, 1);
        assert_eq!(report.removed_entries, 0);
        assert!(!report.removed_directory);
        assert!(lock_dir.join("M00001.lck").exists());
    }

    #[test]
    fn clear_all_removes_everything() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00001.lck", "remote-host", "5", 3, LockKind::Shared);
        let entry_dir = lock_dir.join("D00002.lck");
        std::fs::create_dir(&entry_dir).unwrap();
        std::fs::write(entry_dir.join("E00002.lck"), b"x").unwrap();

        let manager = bed.manager();
        assert_eq!(clear_all(&manager, &bed.resource).unwrap(), 2);
        assert!(!lock_dir.exists());
        assert_eq!(clear_all(&manager, &bed.resource).unwrap(), 0);
    }
}

//! Lock directory scanner.
//!
//! A scan lists the lock directory once and:
//!
//! 1. deletes every entry whose name the protocol could not have produced,
//!    and stray entry files that belong inside an entry directory;
//! 2. (when cleaning up) records entry directories, which mark admissions in
//!    progress. While any are outstanding the scan is retried after a short
//!    pause, because member numbers must not be compared while someone is
//!    still choosing theirs. Entry directories seen on every pass for longer
//!    than `entry_dearth_ms` belong to a dead admitter and are removed;
//! 3. reads every other locker's member file, deleting corrupt ones and ones
//!    owned by dead processes on this machine, and hands the rest to the
//!    caller's visitor.
//!
//! The entry directory bookkeeping lives as long as the `Scanner`. `scan`
//! pauses on outstanding admissions itself; `poll` hands the pause to the
//! caller so it can count against a wait budget.

use super::context::LockContext;
use super::member::{MemberRead, MemberRecord, read_member_file};
use super::naming::{self, EntryKind};
use crate::error::{BakeryError, Result};
use crate::fs::{delete_entry, delete_file_if_present, is_not_found};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// A live member as presented to a scan visitor.
#[derive(Debug)]
pub(crate) struct ScannedMember<'r> {
    pub name: &'r str,
    pub record: &'r MemberRecord,
    /// The caller's own entry, taken from memory rather than disk.
    pub is_self: bool,
}

/// What the visitor wants the scan to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Continue,
    Stop,
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanOutcome {
    /// Every live member was visited.
    Complete,
    /// The lock directory does not exist, so nobody is contending.
    DirectoryMissing,
    /// The visitor asked to stop.
    Stopped,
    /// Admissions are still in progress; pause for `progress_sample` and poll again.
    AdmissionsPending,
}

#[derive(Debug)]
struct ActiveEntry {
    age: Duration,
    seen: bool,
}

/// Scans one lock directory on behalf of one locker.
pub(crate) struct Scanner<'a> {
    ctx: LockContext<'a>,
    lock_dir: &'a Path,
    clean_up: bool,
    own: Option<(&'a str, &'a MemberRecord)>,
    active: HashMap<String, ActiveEntry>,
}

impl<'a> Scanner<'a> {
    /// `clean_up` enables entry directory tracking, waiting and reclamation.
    pub(crate) fn new(ctx: LockContext<'a>, lock_dir: &'a Path, clean_up: bool) -> Self {
        Self {
            ctx,
            lock_dir,
            clean_up,
            own: None,
            active: HashMap::new(),
        }
    }

    /// Report the caller's own member from memory instead of reading its file.
    pub(crate) fn with_own(mut self, member_name: &'a str, record: &'a MemberRecord) -> Self {
        self.own = Some((member_name, record));
        self
    }

    /// Scan until a pass completes with no admissions outstanding.
    pub(crate) fn scan<F>(&mut self, mut visit: F) -> Result<ScanOutcome>
    where
        F: FnMut(&ScannedMember<'_>) -> Result<Visit>,
    {
        loop {
            match self.poll(&mut visit)? {
                ScanOutcome::AdmissionsPending => {
                    std::thread::sleep(self.ctx.config.progress_sample());
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// One pass over the directory.
    ///
    /// Returns `AdmissionsPending` without visiting anyone while entry
    /// directories are outstanding. Each such pass ages them by one
    /// `progress_sample`, so the caller must pause that long before polling
    /// again.
    pub(crate) fn poll<F>(&mut self, visit: &mut F) -> Result<ScanOutcome>
    where
        F: FnMut(&ScannedMember<'_>) -> Result<Visit>,
    {
        let names = match self.ctx.fs.list_directory(self.lock_dir) {
            Ok(names) => names,
            Err(e) if is_not_found(&e) => return Ok(ScanOutcome::DirectoryMissing),
            Err(e) => return Err(BakeryError::io("list", self.lock_dir, e)),
        };

        // Pass one: purge debris, note admissions in progress.
        for entry in self.active.values_mut() {
            entry.seen = false;
        }
        let mut members = Vec::new();
        for name in names {
            match naming::classify(&name) {
                None => self.purge_debris(&name),
                Some(EntryKind::EntryDirectory) => {
                    if self.clean_up {
                        self.active
                            .entry(name)
                            .or_insert(ActiveEntry {
                                age: Duration::ZERO,
                                seen: false,
                            })
                            .seen = true;
                    }
                }
                Some(EntryKind::Member) => members.push(name),
                // Entry files only ever live inside their entry directory.
                Some(EntryKind::EntryFile) => self.purge_debris(&name),
            }
        }
        self.active.retain(|_, entry| entry.seen);
        if !self.active.is_empty() {
            debug!(
                lock_dir = %self.lock_dir.display(),
                outstanding = self.active.len(),
                "admissions in progress"
            );
            self.age_entries();
            return Ok(ScanOutcome::AdmissionsPending);
        }

        // Pass two: visit live members.
        members.sort();
        for name in &members {
            if let Some((own_name, own_record)) = self.own
                && own_name == name
            {
                let member = ScannedMember {
                    name,
                    record: own_record,
                    is_self: true,
                };
                if visit(&member)? == Visit::Stop {
                    return Ok(ScanOutcome::Stopped);
                }
                continue;
            }

            let path = self.lock_dir.join(name);
            let record = match read_member_file(self.ctx.fs, &path, self.ctx.config.member_file_size)? {
                MemberRead::Missing => continue,
                MemberRead::Corrupt(reason) => {
                    warn!(
                        path = %path.display(),
                        %reason,
                        "removing corrupt member file"
                    );
                    self.discard(&path);
                    continue;
                }
                MemberRead::Valid(record) => record,
            };

            if self.ctx.is_local_machine(&record.machine_id)
                && !self
                    .ctx
                    .owner_check
                    .is_valid_owner(&record.execution_id, &record.payload)
            {
                warn!(
                    path = %path.display(),
                    execution_id = %record.execution_id,
                    "removing member file of dead owner"
                );
                self.discard(&path);
                continue;
            }

            let member = ScannedMember {
                name,
                record: &record,
                is_self: false,
            };
            if visit(&member)? == Visit::Stop {
                return Ok(ScanOutcome::Stopped);
            }
        }

        Ok(ScanOutcome::Complete)
    }

    /// Age outstanding entry directories and remove abandoned ones.
    fn age_entries(&mut self) {
        let dearth = self.ctx.config.entry_dearth();
        let sample = self.ctx.config.progress_sample();
        let (ctx, lock_dir) = (self.ctx, self.lock_dir);

        self.active.retain(|name, entry| {
            if entry.age < dearth {
                entry.age += sample;
                return true;
            }

            let path = lock_dir.join(name);
            warn!(
                path = %path.display(),
                age_ms = entry.age.as_millis() as u64,
                "removing abandoned entry directory"
            );
            if let Err(e) = delete_entry(ctx.fs, &path) {
                warn!(path = %path.display(), error = %e, "failed to remove entry directory");
            }
            false
        });
    }

    fn purge_debris(&self, name: &str) {
        let path = self.lock_dir.join(name);
        warn!(path = %path.display(), "removing foreign entry from lock directory");
        if let Err(e) = delete_entry(self.ctx.fs, &path) {
            warn!(path = %path.display(), error = %e, "failed to remove foreign entry");
        }
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = delete_file_if_present(self.ctx.fs, path) {
            warn!(path = %path.display(), error = %e, "failed to remove member file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::member::LockKind;
    use crate::test_support::{TestBed, raw_member_bytes};

    fn collect(mut scanner: Scanner<'_>) -> (ScanOutcome, Vec<(String, u64, bool)>) {
        let mut seen = Vec::new();
        let outcome = scanner
            .scan(|m| {
                seen.push((m.name.to_string(), m.record.lamport_number, m.is_self));
                Ok(Visit::Continue)
            })
            .unwrap();
        (outcome, seen)
    }

    #[test]
    fn missing_directory_is_reported_distinctly() {
        let bed = TestBed::new();
        let ctx = bed.context();
        let lock_dir = bed.lock_dir();

        let (outcome, seen) = collect(Scanner::new(ctx, &lock_dir, true));

        assert_eq!(outcome, ScanOutcome::DirectoryMissing);
        assert!(seen.is_empty());
    }

    #[test]
    fn visits_valid_members_and_purges_debris() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00010.lck", "remote-host", "1", 4, LockKind::Shared);
        bed.write_member("M00020.lck", "remote-host", "2", 9, LockKind::Exclusive);
        std::fs::write(lock_dir.join("notes.txt"), b"junk").unwrap();
        std::fs::create_dir(lock_dir.join("stray-dir")).unwrap();

        let (outcome, seen) = collect(Scanner::new(bed.context(), &lock_dir, true));

        assert_eq!(outcome, ScanOutcome::Complete);
        assert_eq!(
            seen,
            vec![
                ("M00010.lck".to_string(), 4, false),
                ("M00020.lck".to_string(), 9, false)
            ]
        );
        assert_eq!(bed.entry_names(), vec!["M00010.lck", "M00020.lck"]);
    }

    #[test]
    fn own_entry_is_taken_from_memory() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        // On disk the file says 1, in memory we say 5.
        bed.write_member("M00001.lck", &bed.identity.machine_id, "x", 1, LockKind::Shared);
        let own = MemberRecord {
            machine_id: bed.identity.machine_id.clone(),
            execution_id: bed.identity.execution_id.clone(),
            lamport_number: 5,
            kind: LockKind::Exclusive,
            payload: String::new(),
        };

        let scanner = Scanner::new(bed.context(), &lock_dir, true).with_own("M00001.lck", &own);
        let (_, seen) = collect(scanner);

        assert_eq!(seen, vec![("M00001.lck".to_string(), 5, true)]);
    }

    #[test]
    fn corrupt_members_are_deleted() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        std::fs::write(lock_dir.join("M00001.lck"), b"short").unwrap();
        std::fs::write(
            lock_dir.join("M00002.lck"),
            raw_member_bytes("host-only", bed.context().config.member_file_size),
        )
        .unwrap();
        bed.write_member("M00003.lck", "remote-host", "3", 2, LockKind::Shared);

        let (outcome, seen) = collect(Scanner::new(bed.context(), &lock_dir, false));

        assert_eq!(outcome, ScanOutcome::Complete);
        assert_eq!(seen.len(), 1);
        assert_eq!(bed.entry_names(), vec!["M00003.lck"]);
    }

    #[test]
    fn dead_local_owner_is_reclaimed_but_remote_is_trusted() {
        let bed = TestBed::new().with_dead_execution("dead-1");
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00001.lck", &bed.identity.machine_id, "dead-1", 1, LockKind::Exclusive);
        bed.write_member("M00002.lck", "remote-host", "dead-1", 2, LockKind::Exclusive);

        let (_, seen) = collect(Scanner::new(bed.context(), &lock_dir, false));

        assert_eq!(seen, vec![("M00002.lck".to_string(), 2, false)]);
        assert_eq!(bed.entry_names(), vec!["M00002.lck"]);
    }

    #[test]
    fn visitor_stop_ends_scan() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        bed.write_member("M00001.lck", "remote-host", "1", 1, LockKind::Shared);
        bed.write_member("M00002.lck", "remote-host", "2", 2, LockKind::Shared);

        let mut visits = 0;
        let outcome = Scanner::new(bed.context(), &lock_dir, false)
            .scan(|_| {
                visits += 1;
                Ok(Visit::Stop)
            })
            .unwrap();

        assert_eq!(outcome, ScanOutcome::Stopped);
        assert_eq!(visits, 1);
    }

    #[test]
    fn entry_directories_ignored_without_clean_up() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        std::fs::create_dir(lock_dir.join("D00009.lck")).unwrap();

        let (outcome, _) = collect(Scanner::new(bed.context(), &lock_dir, false));

        assert_eq!(outcome, ScanOutcome::Complete);
        assert!(lock_dir.join("D00009.lck").exists());
    }

    #[test]
    fn abandoned_entry_directory_is_removed_after_aging() {
        let bed = TestBed::with_config(crate::config::LockConfig {
            progress_sample_ms: 20,
            entry_dearth_ms: 100,
            ..Default::default()
        });
        let lock_dir = bed.create_lock_dir();
        let entry_dir = lock_dir.join("D00009.lck");
        std::fs::create_dir(&entry_dir).unwrap();
        std::fs::write(entry_dir.join("E00009.lck"), b"half written").unwrap();
        bed.write_member("M00001.lck", "remote-host", "1", 1, LockKind::Shared);

        let (outcome, seen) = collect(Scanner::new(bed.context(), &lock_dir, true));

        assert_eq!(outcome, ScanOutcome::Complete);
        assert_eq!(seen.len(), 1);
        assert!(!entry_dir.exists());
    }

    #[test]
    fn poll_reports_pending_admission_without_visiting() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        std::fs::create_dir(lock_dir.join("D00009.lck")).unwrap();
        bed.write_member("M00001.lck", "remote-host", "1", 1, LockKind::Shared);

        let mut visits = 0;
        let outcome = Scanner::new(bed.context(), &lock_dir, true)
            .poll(&mut |_: &ScannedMember<'_>| {
                visits += 1;
                Ok(Visit::Continue)
            })
            .unwrap();

        assert_eq!(outcome, ScanOutcome::AdmissionsPending);
        assert_eq!(visits, 0);
        assert!(lock_dir.join("D00009.lck").exists());
    }

    #[test]
    fn stray_entry_file_is_purged() {
        let bed = TestBed::new();
        let lock_dir = bed.create_lock_dir();
        std::fs::write(lock_dir.join("E00004.lck"), b"orphan").unwrap();
        bed.write_member("M00001.lck", "remote-host", "1", 1, LockKind::Shared);

        let (outcome, seen) = collect(Scanner::new(bed.context(), &lock_dir, false));

        assert_eq!(outcome, ScanOutcome::Complete);
        assert_eq!(seen.len(), 1);
        assert_eq!(bed.entry_names(), vec!["M00001.lck"]);
    }
}

//! Lamport's Bakery algorithm over the lock directory.
//!
//! After admission a locker takes a ticket one larger than every ticket it
//! can see, publishes it in its member file and then waits until no member
//! that precedes it in `(ticket, member name)` order holds an incompatible
//! lock. Shared holders never wait for each other.

use super::cleanup::CleanupStack;
use super::context::LockContext;
use super::member::{MemberRead, MemberRecord, read_member_file};
use super::naming::EntryPaths;
use super::scanner::{ScanOutcome, ScannedMember, Scanner, Visit};
use crate::config::LockConfig;
use crate::error::{BakeryError, Result};
use crate::fs::{FileKind, delete_file_if_present, write_then_rename};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a lock request may wait for contending holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Give up on the first contention without sleeping.
    TryLock,
    /// Give up once the accumulated sleep reaches this duration.
    Timeout(Duration),
    /// Wait as long as it takes.
    Infinite,
}

impl WaitPolicy {
    /// `Some(0)` is a try-lock, `None` waits forever.
    pub fn from_millis(millis: Option<u64>) -> Self {
        match millis {
            Some(0) => WaitPolicy::TryLock,
            Some(ms) => WaitPolicy::Timeout(Duration::from_millis(ms)),
            None => WaitPolicy::Infinite,
        }
    }
}

/// Result of a sleep request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Nap {
    Slept,
    TimedOut,
}

/// Backoff sleeper enforcing a `WaitPolicy`.
#[derive(Debug)]
pub(crate) struct Sleeper<'a> {
    config: &'a LockConfig,
    policy: WaitPolicy,
    iteration: u32,
    waited: Duration,
}

impl<'a> Sleeper<'a> {
    pub(crate) fn new(config: &'a LockConfig, policy: WaitPolicy) -> Self {
        Self {
            config,
            policy,
            iteration: 0,
            waited: Duration::ZERO,
        }
    }

    /// Sleep for the next backoff interval, unless the budget is used up.
    pub(crate) fn sleep(&mut self) -> Nap {
        match self.next_interval() {
            Some(interval) => {
                self.nap(interval);
                Nap::Slept
            }
            None => Nap::TimedOut,
        }
    }

    /// Sleep a fixed `interval` outside the backoff schedule, charged to the
    /// same budget.
    pub(crate) fn pause(&mut self, interval: Duration) -> Nap {
        if self.exhausted() {
            return Nap::TimedOut;
        }
        self.waited += interval;
        self.nap(interval);
        Nap::Slept
    }

    /// Advance the schedule and return the interval to sleep, or `None` when timed out.
    fn next_interval(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.iteration = self.iteration.saturating_add(1);
        let interval = self.config.poll_interval(self.iteration);
        self.waited += interval;
        Some(interval)
    }

    fn exhausted(&self) -> bool {
        match self.policy {
            WaitPolicy::TryLock => true,
            WaitPolicy::Timeout(max) => self.waited >= max,
            WaitPolicy::Infinite => false,
        }
    }

    fn nap(&self, interval: Duration) {
        let chunk = self.config.sleep_chunk();
        let mut remaining = interval;
        while !remaining.is_zero() {
            let step = remaining.min(chunk);
            std::thread::sleep(step);
            remaining -= step;
        }
    }

    /// Total nominal time slept so far.
    pub(crate) fn waited(&self) -> Duration {
        self.waited
    }
}

/// Whether the owner of `own` must wait for `other`.
///
/// `other` goes first if its ticket is lower, or equal with a lower member
/// name. It only matters when at least one of the two is exclusive.
pub(crate) fn must_yield(
    own_name: &str,
    own: &MemberRecord,
    other_name: &str,
    other: &MemberRecord,
) -> bool {
    let precedes = (other.lamport_number, other_name) < (own.lamport_number, own_name);
    precedes && (own.kind.is_exclusive() || other.kind.is_exclusive())
}

/// One more than the highest ticket visible in `lock_dir`.
pub(crate) fn next_lamport_number(ctx: &LockContext<'_>, lock_dir: &Path) -> Result<u64> {
    let mut highest = 0u64;
    let outcome = Scanner::new(*ctx, lock_dir, false).scan(|member| {
        highest = highest.max(member.record.lamport_number);
        Ok(Visit::Continue)
    })?;

    if outcome == ScanOutcome::DirectoryMissing {
        debug!(lock_dir = %lock_dir.display(), "lock directory vanished while numbering");
    }
    Ok(highest.saturating_add(1))
}

/// Publish `record` as the member file for the reserved number.
///
/// The record is staged inside the entry directory and renamed into place,
/// so other lockers never see a partial member file. On success the entry
/// directory is gone and the member file is registered for rollback.
pub(crate) fn publish_member(
    ctx: &LockContext<'_>,
    paths: &EntryPaths,
    record: &MemberRecord,
    cleanup: &mut CleanupStack<'_>,
) -> Result<()> {
    let bytes = record.encode(ctx.config.member_file_size)?;

    write_then_rename(ctx.fs, &paths.entry_file, &paths.member_file, &bytes)?;
    cleanup.push_file(&paths.member_file);

    ctx.fs
        .delete_directory(&paths.entry_directory)
        .map_err(|e| BakeryError::io("remove entry directory", &paths.entry_directory, e))?;
    cleanup.forget(&paths.entry_directory);

    debug!(
        member = %paths.member_file.display(),
        lamport_number = record.lamport_number,
        kind = %record.kind,
        "published member file"
    );
    Ok(())
}

/// Whether a lock request got the lock or ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Possession {
    Won,
    TimedOut,
}

/// Wait until no preceding member holds an incompatible lock.
pub(crate) fn wait_for_possession(
    ctx: &LockContext<'_>,
    lock_dir: &Path,
    own_name: &str,
    own: &MemberRecord,
    sleeper: &mut Sleeper<'_>,
) -> Result<Possession> {
    let mut scanner = Scanner::new(*ctx, lock_dir, true).with_own(own_name, own);
    loop {
        let mut yielded = false;
        let outcome = scanner.poll(&mut |member: &ScannedMember<'_>| {
            if member.is_self || !must_yield(own_name, own, member.name, member.record) {
                return Ok(Visit::Continue);
            }
            yielded = true;
            if wait_for_departure(ctx, lock_dir, member, sleeper)? {
                Ok(Visit::Continue)
            } else {
                Ok(Visit::Stop)
            }
        })?;

        let timed_out = match outcome {
            ScanOutcome::Stopped => true,
            ScanOutcome::AdmissionsPending => {
                sleeper.pause(ctx.config.progress_sample()) == Nap::TimedOut
            }
            ScanOutcome::DirectoryMissing => {
                warn!(
                    lock_dir = %lock_dir.display(),
                    "lock directory disappeared while waiting; assuming no contenders"
                );
                return Ok(Possession::Won);
            }
            ScanOutcome::Complete if !yielded => return Ok(Possession::Won),
            // Someone left; look again for members that arrived meanwhile.
            ScanOutcome::Complete => false,
        };
        if timed_out {
            debug!(
                lock_dir = %lock_dir.display(),
                waited_ms = sleeper.waited().as_millis() as u64,
                "lock wait timed out"
            );
            return Ok(Possession::TimedOut);
        }
    }
}

/// Poll until `member` is gone. Returns `false` when the sleeper times out.
fn wait_for_departure(
    ctx: &LockContext<'_>,
    lock_dir: &Path,
    member: &ScannedMember<'_>,
    sleeper: &mut Sleeper<'_>,
) -> Result<bool> {
    let path = lock_dir.join(member.name);
    let local = ctx.is_local_machine(&member.record.machine_id);

    debug!(
        holder = %path.display(),
        lamport_number = member.record.lamport_number,
        kind = %member.record.kind,
        "waiting for lock holder"
    );

    loop {
        if sleeper.sleep() == Nap::TimedOut {
            return Ok(false);
        }

        let kind = ctx
            .fs
            .file_kind(&path)
            .map_err(|e| BakeryError::io("stat", &path, e))?;
        if kind == FileKind::NotFound {
            return Ok(true);
        }

        // The number may have been released and taken again by a newcomer.
        match read_member_file(ctx.fs, &path, ctx.config.member_file_size)? {
            MemberRead::Valid(current) if current == *member.record => {}
            _ => return Ok(true),
        }

        if local
            && !ctx
                .owner_check
                .is_valid_owner(&member.record.execution_id, &member.record.payload)
        {
            warn!(
                path = %path.display(),
                execution_id = %member.record.execution_id,
                "lock holder died; removing its member file"
            );
            if let Err(e) = delete_file_if_present(ctx.fs, &path) {
                warn!(path = %path.display(), error = %e, "failed to remove member file");
            }
            return Ok(true);
        }
    }
}

//! Lock and unlock entry points.

use super::admission::{self, Reservation};
use super::bakery::{self, Possession, Sleeper, WaitPolicy};
use super::context::LockContext;
use super::guard::LockGuard;
use super::member::{LockKind, MemberRecord};
use super::naming;
use crate::config::LockConfig;
use crate::error::{BakeryError, Result};
use crate::fs::{FileSystem, StdFileSystem, delete_file_if_present};
use crate::host::{HostIdentity, OwnerCheck, ProcessOwnerCheck};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Proof of a held lock, returned by [`LockManager::lock`].
#[derive(Debug, PartialEq, Eq)]
pub enum LockToken {
    /// Shared access granted without on-disk state because the medium is read-only.
    Implicit,
    /// Absolute path of the member file that holds the lock.
    Member(PathBuf),
}

impl LockToken {
    /// The member file, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            LockToken::Implicit => None,
            LockToken::Member(path) => Some(path),
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, LockToken::Implicit)
    }
}

/// Result of a lock request that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(LockToken),
    /// Contending holders did not leave within the wait policy.
    Busy,
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    pub fn into_token(self) -> Option<LockToken> {
        match self {
            LockOutcome::Acquired(token) => Some(token),
            LockOutcome::Busy => None,
        }
    }
}

/// Acquires and releases Bakery locks on behalf of one execution.
pub struct LockManager {
    config: LockConfig,
    identity: HostIdentity,
    fs: Arc<dyn FileSystem>,
    owner_check: Arc<dyn OwnerCheck>,
    rng: Mutex<StdRng>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Manager on the real filesystem with process-table liveness checks.
    pub fn new(config: LockConfig, identity: HostIdentity) -> Result<Self> {
        Self::with_collaborators(
            config,
            identity,
            Arc::new(StdFileSystem),
            Arc::new(ProcessOwnerCheck),
        )
    }

    /// Manager with injected filesystem and owner check.
    pub fn with_collaborators(
        config: LockConfig,
        identity: HostIdentity,
        fs: Arc<dyn FileSystem>,
        owner_check: Arc<dyn OwnerCheck>,
    ) -> Result<Self> {
        config.validate()?;
        identity.validate()?;

        let mut hasher = DefaultHasher::new();
        identity.machine_id.hash(&mut hasher);
        identity.execution_id.hash(&mut hasher);
        let rng = StdRng::seed_from_u64(hasher.finish());

        Ok(Self {
            config,
            identity,
            fs,
            owner_check,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub(crate) fn file_system(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub(crate) fn context(&self) -> LockContext<'_> {
        LockContext {
            fs: self.fs.as_ref(),
            owner_check: self.owner_check.as_ref(),
            identity: &self.identity,
            config: &self.config,
        }
    }

    /// Absolute lock directory path for `resource`, checked against the path limit.
    pub fn lock_directory(&self, resource: &Path) -> Result<PathBuf> {
        // Rebuilding from components drops trailing separators.
        let resource: PathBuf = std::path::absolute(resource)
            .map_err(|e| BakeryError::io("resolve", resource, e))?
            .components()
            .collect();
        naming::check_path_budget(&resource, self.config.max_path_bytes)?;
        Ok(naming::lock_directory_path(&resource))
    }

    /// Request a `kind` lock on `resource`, waiting according to `wait`.
    ///
    /// `payload` is stored in the member file for the owner check and for
    /// diagnostics.
    pub fn lock(
        &self,
        resource: &Path,
        kind: LockKind,
        wait: WaitPolicy,
        payload: &str,
    ) -> Result<LockOutcome> {
        let lock_dir = self.lock_directory(resource)?;
        self.check_payload(payload)?;
        let ctx = self.context();

        let reservation = match admission::reserve(&ctx, &lock_dir, || self.next_candidate()) {
            Ok(reservation) => reservation,
            Err(e)
                if e.is_read_only()
                    && kind == LockKind::Shared
                    && self.config.implicit_shared_on_read_only =>
            {
                warn!(
                    lock_dir = %lock_dir.display(),
                    error = %e,
                    "lock directory is not writable; granting implicit shared lock"
                );
                return Ok(LockOutcome::Acquired(LockToken::Implicit));
            }
            Err(e) => {
                self.remove_lock_directory(&lock_dir);
                return Err(e);
            }
        };

        match self.complete(&ctx, &lock_dir, reservation, kind, wait, payload) {
            Ok(Some(member_file)) => {
                info!(member = %member_file.display(), %kind, "lock acquired");
                Ok(LockOutcome::Acquired(LockToken::Member(member_file)))
            }
            Ok(None) => {
                self.remove_lock_directory(&lock_dir);
                debug!(lock_dir = %lock_dir.display(), %kind, "lock busy");
                Ok(LockOutcome::Busy)
            }
            Err(e) => {
                self.remove_lock_directory(&lock_dir);
                Err(e)
            }
        }
    }

    /// Number, publish and wait. `None` means the wait timed out; in every
    /// outcome other than success the reservation's artifacts are rolled back.
    fn complete(
        &self,
        ctx: &LockContext<'_>,
        lock_dir: &Path,
        mut reservation: Reservation<'_>,
        kind: LockKind,
        wait: WaitPolicy,
        payload: &str,
    ) -> Result<Option<PathBuf>> {
        let record = MemberRecord {
            machine_id: self.identity.machine_id.clone(),
            execution_id: self.identity.execution_id.clone(),
            lamport_number: bakery::next_lamport_number(ctx, lock_dir)?,
            kind,
            payload: payload.to_string(),
        };
        bakery::publish_member(ctx, &reservation.paths, &record, &mut reservation.cleanup)?;

        let mut sleeper = Sleeper::new(&self.config, wait);
        let possession = bakery::wait_for_possession(
            ctx,
            lock_dir,
            &reservation.paths.member_name,
            &record,
            &mut sleeper,
        )?;

        match possession {
            Possession::Won => {
                reservation.cleanup.disarm();
                Ok(Some(reservation.paths.member_file.clone()))
            }
            Possession::TimedOut => Ok(None),
        }
    }

    /// Release a lock obtained from [`lock`](Self::lock) on the same resource.
    pub fn unlock(&self, resource: &Path, token: LockToken) -> Result<()> {
        let member_file = match token {
            LockToken::Implicit => return Ok(()),
            LockToken::Member(path) => path,
        };

        let lock_dir = self.lock_directory(resource)?;
        if member_file.parent() != Some(lock_dir.as_path()) {
            return Err(BakeryError::User(format!(
                "lock token '{}' does not belong to '{}'",
                member_file.display(),
                resource.display()
            )));
        }

        delete_file_if_present(self.fs.as_ref(), &member_file)
            .map_err(|e| BakeryError::io("remove member file", &member_file, e))?;
        self.remove_lock_directory(&lock_dir);

        info!(member = %member_file.display(), "lock released");
        Ok(())
    }

    /// Like [`lock`](Self::lock), returning a guard that unlocks on drop.
    /// `None` means the lock was busy.
    pub fn acquire_guard(
        &self,
        resource: &Path,
        kind: LockKind,
        wait: WaitPolicy,
        payload: &str,
    ) -> Result<Option<LockGuard<'_>>> {
        Ok(self
            .lock(resource, kind, wait, payload)?
            .into_token()
            .map(|token| LockGuard::new(self, resource.to_path_buf(), token)))
    }

    /// Remove the lock directory if nothing is left in it.
    pub(crate) fn remove_lock_directory(&self, lock_dir: &Path) {
        match self.fs.delete_directory(lock_dir) {
            Ok(()) => debug!(lock_dir = %lock_dir.display(), "removed empty lock directory"),
            Err(e) => debug!(lock_dir = %lock_dir.display(), error = %e, "lock directory kept"),
        }
    }

    fn next_candidate(&self) -> u16 {
        let mut rng = self.rng.lock().unwrap_or_else(|poison| poison.into_inner());
        rng.random()
    }

    /// The payload must survive the line format and leave room in the member file.
    fn check_payload(&self, payload: &str) -> Result<()> {
        if payload.contains(['\0', '\n', '\r']) {
            return Err(BakeryError::User(
                "lock payload must not contain NUL or line breaks".to_string(),
            ));
        }

        let widest = MemberRecord {
            machine_id: self.identity.machine_id.clone(),
            execution_id: self.identity.execution_id.clone(),
            lamport_number: u64::MAX,
            kind: LockKind::Exclusive,
            payload: payload.to_string(),
        };
        widest.encode(self.config.member_file_size).map(|_| ())
    }
}

//! RAII lock guard implementation.

use super::manager::{LockManager, LockToken};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// RAII guard for a held lock.
///
/// When dropped, the lock is released through its manager.
/// If releasing fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,

    /// The locked resource (not the lock directory).
    resource: PathBuf,

    /// `None` once released.
    token: Option<LockToken>,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(manager: &'a LockManager, resource: PathBuf, token: LockToken) -> Self {
        Self {
            manager,
            resource,
            token: Some(token),
        }
    }

    /// The locked resource.
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    /// The held token.
    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the guard
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.manager.unlock(&self.resource, token),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take()
            && let Err(e) = self.manager.unlock(&self.resource, token)
        {
            warn!(
                resource = %self.resource.display(),
                error = %e,
                "failed to release lock"
            );
        }
    }
}

//! Borrowed view of a `LockManager` handed to the protocol steps.

use crate::config::LockConfig;
use crate::fs::FileSystem;
use crate::host::{HostIdentity, OwnerCheck};

/// Collaborators and settings shared by admission, scanning and waiting.
#[derive(Clone, Copy)]
pub(crate) struct LockContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub owner_check: &'a dyn OwnerCheck,
    pub identity: &'a HostIdentity,
    pub config: &'a LockConfig,
}

impl LockContext<'_> {
    /// Whether `machine_id` names this host.
    pub fn is_local_machine(&self, machine_id: &str) -> bool {
        self.owner_check
            .machine_id_match(&self.identity.machine_id, machine_id)
    }
}

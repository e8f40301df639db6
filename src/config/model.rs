//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Bakery lock protocol.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    // =========================================================================
    // On-disk format
    // =========================================================================
    /// Exact size of each member file. Files of any other size are corrupt.
    #[serde(default = "default_member_file_size")]
    pub member_file_size: usize,

    /// Longest path (resource + lock directory + entry names) allowed.
    #[serde(default = "default_max_path_bytes")]
    pub max_path_bytes: usize,

    // =========================================================================
    // Admission
    // =========================================================================
    /// Attempts at reserving a member number before giving up.
    #[serde(default = "default_max_admission_attempts")]
    pub max_admission_attempts: u32,

    // =========================================================================
    // Entry directory aging
    // =========================================================================
    /// Pause between rescans while entry directories are outstanding.
    #[serde(default = "default_progress_sample_ms")]
    pub progress_sample_ms: u64,

    /// Age after which a persistently observed entry directory is abandoned.
    #[serde(default = "default_entry_dearth_ms")]
    pub entry_dearth_ms: u64,

    // =========================================================================
    // Wait loop backoff
    // =========================================================================
    /// Sleep used for the first `ramp_start_iteration` polls.
    #[serde(default = "default_poll_base_ms")]
    pub poll_base_ms: u64,

    /// Last poll that uses the base interval; later polls grow linearly.
    #[serde(default = "default_ramp_start_iteration")]
    pub ramp_start_iteration: u32,

    /// First poll that uses the flat `poll_max_ms` interval.
    #[serde(default = "default_flat_start_iteration")]
    pub flat_start_iteration: u32,

    /// Sleep used once the schedule flattens.
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Longest uninterrupted sleep.
    #[serde(default = "default_sleep_chunk_ms")]
    pub sleep_chunk_ms: u64,

    // =========================================================================
    // Degradation
    // =========================================================================
    /// Grant shared requests without on-disk state when the medium is read-only.
    #[serde(default = "default_true")]
    pub implicit_shared_on_read_only: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            member_file_size: default_member_file_size(),
            max_path_bytes: default_max_path_bytes(),
            max_admission_attempts: default_max_admission_attempts(),
            progress_sample_ms: default_progress_sample_ms(),
            entry_dearth_ms: default_entry_dearth_ms(),
            poll_base_ms: default_poll_base_ms(),
            ramp_start_iteration: default_ramp_start_iteration(),
            flat_start_iteration: default_flat_start_iteration(),
            poll_max_ms: default_poll_max_ms(),
            sleep_chunk_ms: default_sleep_chunk_ms(),
            implicit_shared_on_read_only: default_true(),
        }
    }
}

impl LockConfig {
    /// Pause between scans while entry directories are outstanding.
    pub fn progress_sample(&self) -> Duration {
        Duration::from_millis(self.progress_sample_ms)
    }

    /// Age at which an entry directory is considered abandoned.
    pub fn entry_dearth(&self) -> Duration {
        Duration::from_millis(self.entry_dearth_ms)
    }

    /// Longest uninterrupted sleep.
    pub fn sleep_chunk(&self) -> Duration {
        Duration::from_millis(self.sleep_chunk_ms)
    }

    /// Sleep for the given 1-based poll iteration.
    ///
    /// Base interval up to `ramp_start_iteration`, then growing by one base
    /// interval per poll, then flat at `poll_max_ms` from `flat_start_iteration`.
    pub fn poll_interval(&self, iteration: u32) -> Duration {
        let ms = if iteration <= self.ramp_start_iteration {
            self.poll_base_ms
        } else if iteration < self.flat_start_iteration {
            let steps = u64::from(iteration - (self.ramp_start_iteration - 1));
            self.poll_base_ms.saturating_mul(steps)
        } else {
            self.poll_max_ms
        };
        Duration::from_millis(ms)
    }
}

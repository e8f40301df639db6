//! Default values for `LockConfig` fields.
//!
//! Kept as free functions so serde can fill in missing YAML keys.

/// Size in bytes of every member file. All lockers sharing a directory must agree.
pub const DEFAULT_MEMBER_FILE_SIZE: usize = 512;

/// Longest path the lock protocol will build.
pub const DEFAULT_MAX_PATH_BYTES: usize = 4096;

/// Smallest polling interval the wait loop may use.
pub const MIN_POLL_MS: u64 = 100;

/// Longest single sleep; longer waits are split into chunks of this size.
pub const MAX_SLEEP_CHUNK_MS: u64 = 900;

pub(crate) fn default_member_file_size() -> usize {
    DEFAULT_MEMBER_FILE_SIZE
}
pub(crate) fn default_max_path_bytes() -> usize {
    DEFAULT_MAX_PATH_BYTES
}
pub(crate) fn default_max_admission_attempts() -> u32 {
    1000
}
pub(crate) fn default_progress_sample_ms() -> u64 {
    200
}
pub(crate) fn default_entry_dearth_ms() -> u64 {
    8000
}
pub(crate) fn default_poll_base_ms() -> u64 {
    MIN_POLL_MS
}
pub(crate) fn default_ramp_start_iteration() -> u32 {
    20
}
pub(crate) fn default_flat_start_iteration() -> u32 {
    40
}
pub(crate) fn default_poll_max_ms() -> u64 {
    2000
}
pub(crate) fn default_sleep_chunk_ms() -> u64 {
    MAX_SLEEP_CHUNK_MS
}
pub(crate) fn default_true() -> bool {
    true
}

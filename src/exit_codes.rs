//! Exit code constants for the bakery CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, bad config, invalid identity, path too long)
//! - 4: Lock not acquired (busy, timed out, slot allocation exhausted)
//! - 5: Filesystem failure while running the protocol
//!
//! `bakery run` passes the child's own exit code through when the lock was acquired.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration or identity.
pub const USER_ERROR: i32 = 1;

/// Lock acquisition failure: the lock is busy or could not be allocated.
pub const LOCK_FAILURE: i32 = 4;

/// Filesystem failure: an unrecoverable error from the underlying filesystem.
pub const FILESYSTEM_FAILURE: i32 = 5;

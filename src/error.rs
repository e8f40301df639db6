//! Error types for bakery.
//!
//! Only failures the caller must act on are represented here. Benign protocol
//! events (an entry already gone, a name collision, a corrupt member file) are
//! absorbed where they happen and never become a `BakeryError`. A lock that
//! could not be obtained in time is `LockOutcome::Busy`, not an error.

use crate::exit_codes;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bakery operations.
#[derive(Error, Debug)]
pub enum BakeryError {
    /// User provided invalid arguments.
    #[error("{0}")]
    User(String),

    /// Configuration could not be read or failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// Machine or execution identifier is unusable in member files.
    #[error("invalid lock identity: {0}")]
    InvalidIdentity(String),

    /// The resource path leaves no room for the lock directory and entry names.
    #[error("path '{}' is too long to lock (limit {limit} bytes)", path.display())]
    NameTooLong { path: PathBuf, limit: usize },

    /// The lock directory name is occupied by something we must not destroy.
    #[error("lock is in an unexpected state, try again later: {0}")]
    TryAgain(String),

    /// No free member number could be reserved.
    #[error("could not allocate a lock slot after {attempts} attempts")]
    SlotExhausted { attempts: u32 },

    /// The encoded member record does not fit in a member file.
    #[error("member record is {size} bytes but member files hold {limit}")]
    RecordTooLarge { size: usize, limit: usize },

    /// A filesystem primitive failed.
    #[error("failed to {op} '{}': {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The command wrapped by `bakery run` could not be started.
    #[error("failed to run command: {0}")]
    ChildFailed(String),
}

impl BakeryError {
    /// Wrap an I/O error with the operation and path it concerns.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        BakeryError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the medium refuses writes.
    ///
    /// Shared lock requests degrade to an implicit grant on these.
    pub fn is_read_only(&self) -> bool {
        match self {
            BakeryError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem
            ),
            _ => false,
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BakeryError::User(_) => exit_codes::USER_ERROR,
            BakeryError::Config(_) => exit_codes::USER_ERROR,
            BakeryError::InvalidIdentity(_) => exit_codes::USER_ERROR,
            BakeryError::NameTooLong { .. } => exit_codes::USER_ERROR,
            BakeryError::RecordTooLarge { .. } => exit_codes::USER_ERROR,
            BakeryError::ChildFailed(_) => exit_codes::USER_ERROR,
            BakeryError::TryAgain(_) => exit_codes::LOCK_FAILURE,
            BakeryError::SlotExhausted { .. } => exit_codes::LOCK_FAILURE,
            BakeryError::Io { .. } => exit_codes::FILESYSTEM_FAILURE,
        }
    }
}

/// Result type alias for bakery operations.
pub type Result<T> = std::result::Result<T, BakeryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn user_errors_have_user_exit_code() {
        assert_eq!(
            BakeryError::User("bad".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            BakeryError::InvalidIdentity("a b".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        let err = BakeryError::NameTooLong {
            path: PathBuf::from("/x"),
            limit: 10,
        };
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn contention_errors_have_lock_exit_code() {
        assert_eq!(
            BakeryError::SlotExhausted { attempts: 3 }.exit_code(),
            exit_codes::LOCK_FAILURE
        );
        assert_eq!(
            BakeryError::TryAgain("old lock".to_string()).exit_code(),
            exit_codes::LOCK_FAILURE
        );
    }

    #[test]
    fn io_error_keeps_source_and_context() {
        let err = BakeryError::io(
            "create directory",
            "/tmp/res.lck",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.exit_code(), exit_codes::FILESYSTEM_FAILURE);
        assert!(err.source().is_some());
        let msg = err.to_string();
        assert!(msg.contains("create directory"));
        assert!(msg.contains("/tmp/res.lck"));
    }

    #[test]
    fn read_only_detection() {
        let denied = BakeryError::io(
            "create directory",
            "/ro/x.lck",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(denied.is_read_only());

        let rofs = BakeryError::io(
            "create directory",
            "/ro/x.lck",
            io::Error::from(io::ErrorKind::ReadOnlyFilesystem),
        );
        assert!(rofs.is_read_only());

        let other = BakeryError::io(
            "create directory",
            "/x.lck",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(!other.is_read_only());
        assert!(!BakeryError::User("x".to_string()).is_read_only());
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = BakeryError::SlotExhausted { attempts: 7 };
        assert_eq!(err.to_string(), "could not allocate a lock slot after 7 attempts");

        let err = BakeryError::RecordTooLarge {
            size: 600,
            limit: 512,
        };
        assert_eq!(err.to_string(), "member record is 600 bytes but member files hold 512");
    }
}

//! Bakery file locks.
//!
//! This module implements shared/exclusive locks on arbitrary resources
//! using only ordinary filesystem operations, so it works across processes
//! and across machines sharing a filesystem.
//!
//! # Lock Directory
//!
//! Locking `/data/disk.img` uses the directory `/data/disk.img.lck`. Each
//! locker publishes a fixed-size member file `Mnnnnn.lck` holding its
//! machine id, execution id, Lamport ticket, lock type and payload. A member
//! number is reserved first through the entry directory `Dnnnnn.lck`, whose
//! staging file `Ennnnn.lck` is renamed into place to publish the member.
//!
//! # Ordering
//!
//! A locker draws a ticket one larger than every ticket it sees and waits
//! for every member with a smaller `(ticket, member name)` that holds an
//! incompatible lock. Shared holders coexist; exclusive holders exclude all.
//!
//! # Recovery
//!
//! Corrupt member files, members of dead processes on this machine,
//! abandoned entry directories and foreign files are removed by whichever
//! locker finds them, with a warning.

mod admission;
mod bakery;
mod cleanup;
pub(crate) mod context;
mod guard;
pub mod inspect;
mod manager;
pub mod member;
pub mod naming;
mod scanner;


// Re-export public API
pub use bakery::WaitPolicy;
pub use guard::LockGuard;
pub use inspect::{LockDirectoryReport, MemberInfo, PurgeReport, clear_all, list_members, purge};
pub use manager::{LockManager, LockOutcome, LockToken};
pub use member::{LockKind, MemberRecord};

//! Bakery: shared/exclusive file locks built on Lamport's Bakery algorithm.
//!
//! Locks need nothing but an ordinary (possibly network) filesystem: no
//! byte-range locking, no lock daemon. See [`locks`] for the protocol and
//! [`locks::LockManager`] for the entry points.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod host;
pub mod locks;

#[cfg(test)]
pub(crate) mod test_support;

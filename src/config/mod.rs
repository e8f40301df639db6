//! Configuration model for bakery.
//!
//! `LockConfig` holds the tunables every participant of a lock directory must
//! agree on (member file size) and the local retry, aging and backoff schedule.
//! It is read from YAML, unknown fields are ignored for forward compatibility,
//! and every field has a default.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::LockConfig;

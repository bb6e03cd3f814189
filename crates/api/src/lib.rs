// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]

//! # Sigil API
//!
//! Abstract contracts between the Sigil core and its external collaborators:
//! the persistence layer (the storage backend is out of the core's scope) and
//! the chain endpoint (the contract ABIs are opaque wire schemas).
//!
//! Every trait here is `async` because the concrete implementations perform
//! I/O; the in-memory test backend simply resolves immediately.

/// The chain endpoint, log codec and action encoder seams.
pub mod chain;
/// The persistence contracts and their record types.
pub mod storage;

pub use storage::StorageError;

// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]

//! # Sigil Storage
//!
//! The in-memory reference implementation of every persistence contract in
//! `sigil-api`. One [`MemoryStore`] is one validator's storage handle; all
//! tables live behind a single lock so `commit_transition` is genuinely
//! atomic with respect to readers.
//!
//! A durable backend (the production deployment uses an embedded database)
//! implements the same traits; the machine, watcher and submitter never see
//! the difference.

mod memory;

pub use memory::MemoryStore;

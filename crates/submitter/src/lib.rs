// Path: crates/submitter/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # Sigil Submitter
//!
//! The transaction submitter: a durable, nonce-ordered outbox that
//! serialises every chain submission from one signing identity.
//!
//! Enqueueing allocates the account's next pending nonce and persists the
//! encoded transaction; the pump loop, run on every block tick and after
//! each enqueue, reconciles against the chain's confirmed nonce, re-signs
//! stuck entries with bumped fees, and retries until each entry lands. The
//! submitter is the sole nonce allocator for its identity; crash recovery
//! leans on the chain's own nonce semantics for idempotency.

mod error;
mod fees;
mod outbox;

pub use error::SubmitterError;
pub use fees::FeeEstimator;
pub use outbox::Submitter;

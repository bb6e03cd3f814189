// Path: crates/crypto/src/lib.rs
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

//! # Sigil Crypto
//!
//! The FROST-side cryptography of the Sigil validator: secp256k1 point and
//! scalar plumbing over `k256`, the Keccak-256 hash domains every validator
//! and the on-chain verifier must agree on bit-for-bit, Merkle trees for
//! participant sets and nonce batches, the verifiable-secret-sharing math of
//! key generation, and the FROST signing equations.
//!
//! Nothing in this crate performs I/O or holds long-lived state; secret
//! material enters and leaves as opaque byte scalars owned by the caller's
//! persistence layer.

pub mod error;
pub mod frost;
pub mod hash;
pub mod merkle;
pub mod noncetree;
pub mod point;
pub mod sealed;
pub mod vss;

pub use error::CryptoError;

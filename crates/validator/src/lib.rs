// Path: crates/validator/src/lib.rs
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

//! # Sigil Validator
//!
//! The daemon wrapping the Sigil core: configuration loading, the JSON-RPC
//! chain client, the reference wire codec, and the runtime loop that pipes
//! watcher → machine → submitter with one wall of atomicity per transition.

/// Configuration file loading.
pub mod config;
/// The JSON-RPC chain client.
pub mod rpc;
/// The per-validator runtime loop.
pub mod runtime;
/// The reference log codec and action encoder.
pub mod wire;

pub use runtime::Validator;

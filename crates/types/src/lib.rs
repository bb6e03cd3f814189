// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Sigil Types
//!
//! This crate is the foundational library for the Sigil validator, containing
//! all core data structures, error types, and configuration objects.
//!
//! ## Architectural Role
//!
//! As the base crate, `sigil-types` has minimal dependencies and is itself a
//! dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `GroupId`, `ChainEvent`, `Action`, and the protocol
//! state enums.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::ProtocolError> = std::result::Result<T, E>;

/// Commands emitted by the state machine and consumed by the submitter.
pub mod action;
/// Light-weight chain-side structures (blocks, logs, fees, raw transactions).
pub mod chain;
/// The canonical, deterministic binary codec for persisted and hashed state.
pub mod codec;
/// Shared configuration structures for the validator and its components.
pub mod config;
/// A unified set of the error types used across the workspace.
pub mod error;
/// Chain events and the ordered transition stream they form.
pub mod event;
/// Participants, groups, and the group-derivation context.
pub mod group;
/// Opaque 32-byte identifiers and small wire primitives.
pub mod ids;
/// Verified payload kinds (epoch rollovers and account transactions).
pub mod packet;
/// Protocol state: rollover, per-signature signing, and mutable consensus.
pub mod state;

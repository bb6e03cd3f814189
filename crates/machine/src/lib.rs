// Path: crates/machine/src/lib.rs
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

//! # Sigil Machine
//!
//! The protocol core: the verification engine, the key-gen client, the
//! signing client, and the state machine that coordinates them.
//!
//! The machine is a pure function over its inputs: `(config, collaborators,
//! state, transition) → (diff, actions)`. Every chain submission it wants is
//! emitted as an [`sigil_types::action::Action`]; every state change is
//! returned as a [`sigil_types::state::StateDiff`] for the caller to commit
//! atomically. The machine itself never writes the three sub-states and
//! never talks to the chain.

pub mod error;
pub mod keygen;
pub mod machine;
pub mod signing;
pub mod verify;

pub use error::MachineError;
pub use machine::{Applied, Machine};

// Path: crates/machine/src/error.rs

//! Error types for the protocol state machine.

use sigil_api::StorageError;
use sigil_types::error::{CodecError, ErrorCode, ProtocolError, VerifyError};
use thiserror::Error;

/// Errors surfaced while applying a transition.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The transition stream regressed; this is a programmer error in the
    /// watcher and causes no state change.
    #[error("out-of-order transition: last ({last_block}, {last_index}), got ({block}, {index})")]
    OutOfOrder {
        /// Last accepted block.
        last_block: u64,
        /// Last accepted intra-block index.
        last_index: u64,
        /// Offending block.
        block: u64,
        /// Offending intra-block index.
        index: u64,
    },
    /// The persistence layer failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A protocol violation that aborts the current group or request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The canonical codec failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Packet verification failed while the machine required success (a
    /// self-built packet failed its own checks).
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl ErrorCode for MachineError {
    fn code(&self) -> &'static str {
        match self {
            Self::OutOfOrder { .. } => "MACHINE_OUT_OF_ORDER",
            Self::Storage(e) => e.code(),
            Self::Protocol(e) => e.code(),
            Self::Codec(e) => e.code(),
            Self::Verify(e) => e.code(),
        }
    }
}

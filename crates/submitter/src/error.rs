// Path: crates/submitter/src/error.rs

//! Error types for the transaction submitter.

use sigil_api::chain::WireError;
use sigil_api::StorageError;
use sigil_types::error::{ChainError, CodecError, ErrorCode};
use thiserror::Error;

/// Failures of the submitter. Send failures inside a pump tick are handled
/// by stopping the tick, not by surfacing here.
#[derive(Debug, Error)]
pub enum SubmitterError {
    /// The chain endpoint failed outside the per-entry send path.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The outbox store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An action could not be encoded or signed.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The canonical codec failed while deriving an action id.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorCode for SubmitterError {
    fn code(&self) -> &'static str {
        match self {
            Self::Chain(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Wire(_) => "SUBMITTER_WIRE",
            Self::Codec(e) => e.code(),
        }
    }
}

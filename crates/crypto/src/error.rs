// Path: crates/crypto/src/error.rs

//! Error types for cryptographic operations.

use thiserror::Error;

/// Failures of the low-level cryptographic operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Bytes did not decode to a valid curve point.
    #[error("invalid curve point encoding")]
    InvalidPoint,
    /// Bytes did not decode to a valid field scalar.
    #[error("invalid scalar encoding")]
    InvalidScalar,
    /// A Lagrange denominator inverted to zero (duplicate signer indices).
    #[error("degenerate signer set")]
    DegenerateSignerSet,
    /// An authenticated decryption failed.
    #[error("share decryption failed")]
    DecryptionFailed,
    /// A requested tree size is not a power of two.
    #[error("tree size {0} is not a power of two")]
    NotPowerOfTwo(u32),
    /// A leaf index is outside the tree.
    #[error("leaf index {index} out of range for {leaves} leaves")]
    LeafOutOfRange {
        /// The offending index.
        index: u32,
        /// The tree's leaf count.
        leaves: u32,
    },
}

impl From<CryptoError> for sigil_types::error::ProtocolError {
    fn from(e: CryptoError) -> Self {
        sigil_types::error::ProtocolError::Crypto(e.to_string())
    }
}

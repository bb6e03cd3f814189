// Path: crates/types/src/error.rs
//! Core error types for the Sigil validator.

use crate::ids::{GroupId, ParticipantId};
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The codes double as metric labels, so they must never change once shipped.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors surfaced by the chain RPC endpoint.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The transport failed (connect, timeout, 5xx).
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint rejected the request with a rate limit (HTTP 429 or
    /// EIP-1474 limit-exceeded).
    #[error("rate limited by endpoint")]
    RateLimited,
    /// The transaction nonce was already consumed on chain.
    #[error("nonce too low")]
    NonceTooLow,
    /// The node rejected the transaction during execution/validation.
    #[error("execution rejected: {0}")]
    Execution(String),
    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// The EIP-1474 error code for a rate-limited request.
pub const JSON_RPC_LIMIT_EXCEEDED: i64 = -32005;

impl ChainError {
    /// Classifies a JSON-RPC error object into a [`ChainError`].
    pub fn from_json_rpc(code: i64, message: &str) -> ChainError {
        if code == JSON_RPC_LIMIT_EXCEEDED {
            return ChainError::RateLimited;
        }
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("nonce too low") {
            return ChainError::NonceTooLow;
        }
        ChainError::Execution(message.to_string())
    }

    /// True when the caller should back off and retry later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ChainError::RateLimited)
    }

    /// True when the error means the nonce was already consumed, including
    /// the variant where the node wraps it inside an execution error.
    pub fn is_nonce_too_low(&self) -> bool {
        match self {
            ChainError::NonceTooLow => true,
            ChainError::Execution(msg) => msg.to_ascii_lowercase().contains("nonce too low"),
            _ => false,
        }
    }
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "CHAIN_TRANSPORT",
            Self::RateLimited => "CHAIN_RATE_LIMITED",
            Self::NonceTooLow => "CHAIN_NONCE_TOO_LOW",
            Self::Execution(_) => "CHAIN_EXECUTION_REJECTED",
            Self::Decode(_) => "CHAIN_DECODE",
        }
    }
}

/// Semantic verification failures. A packet failing any of these is dropped
/// and its digest is never remembered.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The packet names a different chain or consensus contract.
    #[error("packet domain mismatch")]
    WrongDomain,
    /// The account transaction uses an operation outside the allow-list.
    #[error("unsupported operation")]
    UnsupportedOperation,
    /// The calldata selector is not in the allow-list.
    #[error("unsupported selector {0}")]
    UnsupportedSelector(String),
    /// An epoch rollover that does not propose `active_epoch + 1`.
    #[error("epoch mismatch: expected {expected}, got {got}")]
    EpochMismatch {
        /// The epoch the packet was required to propose.
        expected: u64,
        /// The epoch it actually proposed.
        got: u64,
    },
    /// The rollover block does not lie on an epoch boundary.
    #[error("block {0} is not an epoch boundary")]
    NotOnEpochBoundary(u64),
    /// The packet was structurally invalid.
    #[error("malformed packet: {0}")]
    Malformed(String),
    /// The digest set could not be read or written.
    #[error("digest store error: {0}")]
    Storage(String),
}

impl ErrorCode for VerifyError {
    fn code(&self) -> &'static str {
        match self {
            Self::WrongDomain => "VERIFY_WRONG_DOMAIN",
            Self::UnsupportedOperation => "VERIFY_UNSUPPORTED_OPERATION",
            Self::UnsupportedSelector(_) => "VERIFY_UNSUPPORTED_SELECTOR",
            Self::EpochMismatch { .. } => "VERIFY_EPOCH_MISMATCH",
            Self::NotOnEpochBoundary(_) => "VERIFY_NOT_ON_EPOCH_BOUNDARY",
            Self::Malformed(_) => "VERIFY_MALFORMED",
            Self::Storage(_) => "VERIFY_STORAGE",
        }
    }
}

/// Protocol violations observed while driving key-gen or signing.
///
/// Own-visible violations abort the current group or request; peer-visible
/// violations are answered with a complaint.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A nonce slot was used a second time.
    #[error("nonce slot ({chunk}, {offset}) already burned")]
    NonceSlotBurned {
        /// Chunk of the burned slot.
        chunk: u32,
        /// Offset of the burned slot.
        offset: u32,
    },
    /// A participant committed twice in one ceremony.
    #[error("duplicate commitment from participant {0}")]
    DuplicateCommitment(ParticipantId),
    /// A participant's proof of knowledge did not verify.
    #[error("invalid proof of knowledge from participant {0}")]
    InvalidProofOfKnowledge(ParticipantId),
    /// A participant's Merkle membership proof did not verify.
    #[error("invalid membership proof from participant {0}")]
    InvalidMembershipProof(ParticipantId),
    /// A peer's share failed the VSS check against its commitments.
    #[error("share from participant {0} failed verification")]
    ShareVerificationFailed(ParticipantId),
    /// A request names fewer signers than the group threshold.
    #[error("not enough signers: required {required}, got {got}")]
    NotEnoughSigners {
        /// The group threshold.
        required: u16,
        /// The size of the offered signer set.
        got: u16,
    },
    /// A signer outside the group's participant set.
    #[error("participant {0} is not a member of the group")]
    UnknownSigner(ParticipantId),
    /// The named group is not persisted.
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),
    /// Our own freshly computed share failed its self-check.
    #[error("signature share failed self-verification")]
    SelfCheckFailed,
    /// The ceremony was aborted after a proven-bad share.
    #[error("group {0} aborted")]
    GroupAborted(GroupId),
    /// A lower-level cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::NonceSlotBurned { .. } => "PROTO_NONCE_SLOT_BURNED",
            Self::DuplicateCommitment(_) => "PROTO_DUPLICATE_COMMITMENT",
            Self::InvalidProofOfKnowledge(_) => "PROTO_INVALID_POK",
            Self::InvalidMembershipProof(_) => "PROTO_INVALID_MEMBERSHIP",
            Self::ShareVerificationFailed(_) => "PROTO_SHARE_VERIFICATION",
            Self::NotEnoughSigners { .. } => "PROTO_NOT_ENOUGH_SIGNERS",
            Self::UnknownSigner(_) => "PROTO_UNKNOWN_SIGNER",
            Self::UnknownGroup(_) => "PROTO_UNKNOWN_GROUP",
            Self::SelfCheckFailed => "PROTO_SELF_CHECK_FAILED",
            Self::GroupAborted(_) => "PROTO_GROUP_ABORTED",
            Self::Crypto(_) => "PROTO_CRYPTO",
        }
    }
}

/// Failures of the canonical codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("canonical encode failed: {0}")]
    Encode(String),
    /// Deserialization failed.
    #[error("canonical decode failed: {0}")]
    Decode(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "CODEC_ENCODE",
            Self::Decode(_) => "CODEC_DECODE",
        }
    }
}

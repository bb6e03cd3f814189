// Path: crates/api/src/storage.rs

//! The persistence contracts the core writes through.
//!
//! The logical layout is five keyed tables (`groups`, `signing_requests`
//! (keyed by message digest), `mutable_consensus` (singleton), `outbox`, and
//! `watcher_cursor`) plus the key-gen ceremony and nonce-tree bookkeeping
//! the clients need. The concrete backend is an external collaborator; the
//! in-memory implementation in `sigil-storage` is the reference.

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigil_types::action::Action;
use sigil_types::chain::{FeeEstimate, RawTransaction};
use sigil_types::group::Group;
use sigil_types::ids::{
    ActionId, CompressedPoint, GroupId, MessageDigest, ParticipantId, ScalarBytes, SignatureId,
};
use sigil_types::state::{MutableConsensusState, RolloverState, SigningState, StateDiff};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Represents errors that can occur within the durable storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A generic error originating from the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found")]
    NotFound,
}

impl sigil_types::error::ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORAGE_BACKEND",
            Self::Encode(_) => "STORAGE_ENCODE",
            Self::Decode(_) => "STORAGE_DECODE",
            Self::NotFound => "STORAGE_NOT_FOUND",
        }
    }
}

/// The machine's three sub-states plus the watcher cursor, read as one
/// consistent snapshot and advanced by atomic diff commits.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The current rollover state (defaults to `WaitingForGenesis`).
    async fn rollover(&self) -> Result<RolloverState, StorageError>;

    /// One signing entry by digest.
    async fn signing_entry(
        &self,
        digest: &MessageDigest,
    ) -> Result<Option<SigningState>, StorageError>;

    /// Every in-flight signing entry.
    async fn signing_entries(
        &self,
    ) -> Result<BTreeMap<MessageDigest, SigningState>, StorageError>;

    /// The replicated consensus bookkeeping (defaults to empty).
    async fn consensus(&self) -> Result<MutableConsensusState, StorageError>;

    /// The last chain block whose transitions are fully applied, per chain.
    async fn last_indexed_block(&self, chain_id: u64) -> Result<Option<u64>, StorageError>;

    /// Atomically applies a transition's entire diff and advances the
    /// watcher cursor. This is the single wall of atomicity: a crash either
    /// keeps the whole transition or none of it.
    async fn commit_transition(
        &self,
        chain_id: u64,
        last_indexed_block: u64,
        diff: StateDiff,
    ) -> Result<(), StorageError>;
}

/// The `groups` table.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Fetches a group by id.
    async fn group(&self, id: &GroupId) -> Result<Option<Group>, StorageError>;

    /// Inserts or replaces a group.
    async fn put_group(&self, group: &Group) -> Result<(), StorageError>;

    /// Removes a group no epoch references any more.
    async fn retire_group(&self, id: &GroupId) -> Result<(), StorageError>;
}

/// Bookkeeping for one open key-gen ceremony.
///
/// `coefficients` are this validator's secret polynomial coefficients; they
/// are move-only material owned by the storage layer and handed to the
/// key-gen client as opaque scalars.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenCeremony {
    /// This validator's secret polynomial coefficients, constant term first.
    pub coefficients: Vec<ScalarBytes>,
    /// Verified peer coefficient commitments, by participant.
    pub commitments: BTreeMap<ParticipantId, Vec<CompressedPoint>>,
    /// Participants whose encrypted shares have been received and verified.
    pub shares_received: BTreeSet<ParticipantId>,
    /// Running sum of verified incoming shares (this validator's eventual
    /// signing share).
    pub signing_share_acc: ScalarBytes,
    /// Participants proven compromised during complaint resolution.
    pub compromised: BTreeSet<ParticipantId>,
}

/// Per-ceremony state for the key-gen client.
#[async_trait]
pub trait KeygenStore: Send + Sync {
    /// Fetches the ceremony record for a group.
    async fn ceremony(&self, group_id: &GroupId) -> Result<Option<KeygenCeremony>, StorageError>;

    /// Inserts or replaces a ceremony record.
    async fn put_ceremony(
        &self,
        group_id: &GroupId,
        ceremony: &KeygenCeremony,
    ) -> Result<(), StorageError>;

    /// Drops a ceremony record once the group is confirmed or aborted.
    async fn remove_ceremony(&self, group_id: &GroupId) -> Result<(), StorageError>;
}

/// One leaf of a pre-committed nonce tree as handed to the signing client.
/// `None` scalars mean the slot was burned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceLeaf {
    /// Secret hiding nonce `d`; zeroed after burn.
    pub hiding_nonce: Option<ScalarBytes>,
    /// Public hiding commitment `D = d·G`.
    pub hiding_commitment: CompressedPoint,
    /// Secret binding nonce `e`; zeroed after burn.
    pub binding_nonce: Option<ScalarBytes>,
    /// Public binding commitment `E = e·G`.
    pub binding_commitment: CompressedPoint,
}

/// A persisted nonce tree: the leaves plus the Merkle root they commit to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceTreeRecord {
    /// Root the tree was committed under.
    pub root: B256,
    /// All leaves, offset order.
    pub leaves: Vec<NonceLeaf>,
}

/// Nonce-tree persistence: trees are stored under their root, then linked to
/// a `(group, chunk)` pair when the chain acknowledges the commitment.
#[async_trait]
pub trait NonceTreeStore: Send + Sync {
    /// Stores a freshly created tree under its root.
    async fn put_tree(&self, record: &NonceTreeRecord) -> Result<(), StorageError>;

    /// Binds a stored tree to `(group, chunk)`.
    async fn link_tree(
        &self,
        root: &B256,
        group_id: &GroupId,
        chunk: u32,
    ) -> Result<(), StorageError>;

    /// Reads one leaf. Returns `Ok(None)` when the tree or offset does not
    /// exist; a burned leaf is returned with its secrets stripped.
    async fn leaf(
        &self,
        group_id: &GroupId,
        chunk: u32,
        offset: u32,
    ) -> Result<Option<NonceLeaf>, StorageError>;

    /// The tree bound to `(group, chunk)`, if any.
    async fn tree(
        &self,
        group_id: &GroupId,
        chunk: u32,
    ) -> Result<Option<NonceTreeRecord>, StorageError>;

    /// Zeroes the secrets of one leaf. Returns `false` when the slot was
    /// already burned (the caller maps that to a protocol violation).
    async fn burn_leaf(
        &self,
        group_id: &GroupId,
        chunk: u32,
        offset: u32,
    ) -> Result<bool, StorageError>;

    /// Unburned leaves remaining across all linked trees of a group.
    async fn remaining_leaves(&self, group_id: &GroupId) -> Result<u64, StorageError>;
}

/// Per-request bookkeeping for the signing client: the signer set assigned
/// by the request, the sequence this validator must serve it from, and the
/// nonce commitments revealed so far.
#[async_trait]
pub trait SigningSessionStore: Send + Sync {
    /// Records the signer set and sequence when a request opens.
    async fn open_session(
        &self,
        signature_id: &SignatureId,
        signers: &BTreeSet<ParticipantId>,
        sequence: u64,
    ) -> Result<(), StorageError>;

    /// The signer set of an open session.
    async fn signers(
        &self,
        signature_id: &SignatureId,
    ) -> Result<Option<BTreeSet<ParticipantId>>, StorageError>;

    /// The sequence of an open session.
    async fn sequence(&self, signature_id: &SignatureId) -> Result<Option<u64>, StorageError>;

    /// Records one signer's revealed nonce commitments.
    async fn put_commitment(
        &self,
        signature_id: &SignatureId,
        participant: ParticipantId,
        hiding: CompressedPoint,
        binding: CompressedPoint,
    ) -> Result<(), StorageError>;

    /// Every recorded commitment of a session, by signer.
    async fn commitments(
        &self,
        signature_id: &SignatureId,
    ) -> Result<BTreeMap<ParticipantId, (CompressedPoint, CompressedPoint)>, StorageError>;

    /// Drops a session once its request completes or is abandoned.
    async fn remove_session(&self, signature_id: &SignatureId) -> Result<(), StorageError>;
}

/// The set of digests the verification engine has accepted.
#[async_trait]
pub trait VerifiedDigestStore: Send + Sync {
    /// Remembers a digest after successful verification.
    async fn insert(&self, digest: &MessageDigest) -> Result<(), StorageError>;

    /// True when the digest has ever been verified by this validator.
    async fn contains(&self, digest: &MessageDigest) -> Result<bool, StorageError>;
}

/// The submission status of one outbox entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Recorded, never sent.
    Pending,
    /// Sent at least once, not yet confirmed.
    Submitted,
    /// Confirmed on chain (or superseded at the same nonce).
    Executed,
}

/// One durable outbox row, ordered by ascending nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    /// Chain nonce the entry is pinned to.
    pub nonce: u64,
    /// Stable id of the originating action.
    pub action_id: ActionId,
    /// The originating action; re-encoded on every send attempt.
    pub action: Action,
    /// The most recently signed raw transaction.
    pub raw_tx: RawTransaction,
    /// Fees used for the last send, if any.
    pub last_fees: Option<FeeEstimate>,
    /// Hash of the last send, if any.
    pub last_hash: Option<B256>,
    /// Where the entry is in its life cycle.
    pub status: SubmissionStatus,
}

/// The durable, nonce-ordered outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends a new entry. The caller guarantees the nonce is the account's
    /// next pending nonce.
    async fn append(&self, entry: &SubmissionEntry) -> Result<(), StorageError>;

    /// Every entry that is not yet executed, ascending by nonce.
    async fn unexecuted(&self) -> Result<Vec<SubmissionEntry>, StorageError>;

    /// Bulk-marks every entry below `nonce` as executed. Returns how many
    /// entries changed status.
    async fn mark_executed_below(&self, nonce: u64) -> Result<u64, StorageError>;

    /// Marks a single entry executed (nonce-too-low reconciliation).
    async fn mark_executed(&self, nonce: u64) -> Result<(), StorageError>;

    /// Records the result of a successful send.
    async fn record_submission(
        &self,
        nonce: u64,
        raw_tx: &RawTransaction,
        hash: B256,
        fees: FeeEstimate,
    ) -> Result<(), StorageError>;
}

/// Everything the validator runtime needs from its one storage handle.
pub trait ValidatorStorage:
    StateStore
    + GroupStore
    + KeygenStore
    + NonceTreeStore
    + SigningSessionStore
    + VerifiedDigestStore
    + OutboxStore
{
}

impl<T> ValidatorStorage for T where
    T: StateStore
        + GroupStore
        + KeygenStore
        + NonceTreeStore
        + SigningSessionStore
        + VerifiedDigestStore
        + OutboxStore
{
}

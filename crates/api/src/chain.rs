// Path: crates/api/src/chain.rs

//! The chain-endpoint seams.
//!
//! [`ChainRpc`] is the minimal JSON-RPC surface the watcher and the submitter
//! consume. [`LogCodec`] and [`ActionEncoder`] are the opaque wire schemas:
//! they own the contract ABIs, the event selectors, and transaction signing;
//! the core only sees decoded [`ChainEvent`]s and hands back [`Action`]s.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use sigil_types::action::Action;
use sigil_types::chain::{BlockRef, FeeEstimate, LogEntry, RawTransaction};
use sigil_types::error::ChainError;
use sigil_types::event::{ChainEvent, EventKind};
use thiserror::Error;

/// Which chain state a nonce query is answered against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    /// The latest confirmed block.
    Latest,
    /// The pending state, including queued transactions.
    Pending,
}

/// A `getLogs` filter. `topic0` entries are ORed; an empty list matches any
/// selector.
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    /// Inclusive range start (warp queries only).
    pub from_block: Option<u64>,
    /// Inclusive range end (warp queries only).
    pub to_block: Option<u64>,
    /// Contract addresses to match.
    pub addresses: Vec<Address>,
    /// Event selectors to match in topic position zero.
    pub topic0: Vec<B256>,
}

/// The JSON-RPC surface of the coordinator/consensus chain endpoint.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// The current head block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// A block header by number.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockRef>, ChainError>;

    /// A block header by hash.
    async fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRef>, ChainError>;

    /// Logs matching a range filter.
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError>;

    /// Logs of one specific block, matched by hash (reorg-safe).
    async fn logs_by_block_hash(
        &self,
        hash: B256,
        filter: &LogFilter,
    ) -> Result<Vec<LogEntry>, ChainError>;

    /// The account's transaction count at the given tag.
    async fn transaction_count(&self, address: Address, tag: BlockTag)
        -> Result<u64, ChainError>;

    /// An EIP-1559 fee estimate for the next block.
    async fn estimate_fees(&self) -> Result<FeeEstimate, ChainError>;

    /// Broadcasts a signed transaction, returning its hash.
    async fn send_raw_transaction(&self, tx: &RawTransaction) -> Result<B256, ChainError>;
}

/// Failures at the wire-schema boundary.
#[derive(Debug, Error)]
pub enum WireError {
    /// A log claimed a known selector but did not decode.
    #[error("log decode failed for {kind}: {reason}")]
    Decode {
        /// The event kind the selector mapped to.
        kind: &'static str,
        /// Why decoding failed.
        reason: String,
    },
    /// An action could not be encoded or signed.
    #[error("action encode failed: {0}")]
    Encode(String),
}

/// Decodes contract logs into [`ChainEvent`]s. Implementations own the event
/// ABI; the watcher only uses selectors (for blooms and per-event splits) and
/// the decoded result.
pub trait LogCodec: Send + Sync {
    /// The contract addresses whose logs are watched.
    fn watched_addresses(&self) -> Vec<Address>;

    /// The topic-0 selector of an event kind.
    fn selector(&self, kind: EventKind) -> B256;

    /// The event kind a selector maps to, if it is one of ours.
    fn kind_of(&self, topic0: &B256) -> Option<EventKind>;

    /// Decodes a raw log. Returns `Ok(None)` for logs whose selector is not
    /// one of ours (they are skipped silently).
    fn decode(&self, log: &LogEntry) -> Result<Option<ChainEvent>, WireError>;
}

/// Turns an [`Action`] into a signed transaction for this validator's
/// identity. Called on every send attempt so fees can be bumped.
#[async_trait]
pub trait ActionEncoder: Send + Sync {
    /// The signing identity's address (nonce owner).
    fn sender(&self) -> Address;

    /// Encodes and signs `action` at `nonce` with the given fees.
    async fn encode(
        &self,
        action: &Action,
        nonce: u64,
        fees: FeeEstimate,
    ) -> Result<RawTransaction, WireError>;
}

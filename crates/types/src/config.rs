// Path: crates/types/src/config.rs

//! Shared configuration structures for the validator and its components.

use crate::event::EventKind;
use crate::group::Participant;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

fn default_page_size() -> u64 {
    10_000
}
fn default_max_logs_per_query() -> usize {
    10_000
}
fn default_block_time_ms() -> u64 {
    12_000
}
fn default_max_reorg_depth() -> u64 {
    64
}
fn default_retry_count() -> u32 {
    3
}
fn default_backoff_delays_ms() -> Vec<u64> {
    vec![1_000, 2_000, 5_000, 10_000, 30_000]
}
fn default_fee_bump_numerator() -> u64 {
    101
}
fn default_fee_bump_denominator() -> u64 {
    100
}
fn default_nonce_tree_size() -> u32 {
    256
}
fn default_nonce_low_water_mark() -> u32 {
    16
}

/// Tuning knobs for the chain watcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Poll delay between head checks in follow mode.
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// Deepest reorg the watcher tolerates before turning fatal.
    #[serde(default = "default_max_reorg_depth")]
    pub max_reorg_depth: u64,
    /// Initial `getLogs` range size in warp mode.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// A log query returning at least this many entries is treated as
    /// overflowed and split.
    #[serde(default = "default_max_logs_per_query")]
    pub max_logs_per_query: usize,
    /// Retries for a by-hash block query before splitting per event.
    #[serde(default = "default_retry_count")]
    pub block_single_query_retry_count: u32,
    /// Event kinds that may be dropped with a warning when they fail to
    /// query or decode.
    #[serde(default)]
    pub fallible_events: Vec<EventKind>,
    /// Backoff ladder applied to rate-limited polls.
    #[serde(default = "default_backoff_delays_ms")]
    pub backoff_delays_ms: Vec<u64>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            block_time_ms: default_block_time_ms(),
            max_reorg_depth: default_max_reorg_depth(),
            page_size: default_page_size(),
            max_logs_per_query: default_max_logs_per_query(),
            block_single_query_retry_count: default_retry_count(),
            fallible_events: Vec::new(),
            backoff_delays_ms: default_backoff_delays_ms(),
        }
    }
}

/// Tuning knobs for the transaction submitter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitterConfig {
    /// Numerator of the fee bump applied on every (re-)submission.
    #[serde(default = "default_fee_bump_numerator")]
    pub fee_bump_numerator: u64,
    /// Denominator of the fee bump.
    #[serde(default = "default_fee_bump_denominator")]
    pub fee_bump_denominator: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        SubmitterConfig {
            fee_bump_numerator: default_fee_bump_numerator(),
            fee_bump_denominator: default_fee_bump_denominator(),
        }
    }
}

/// The validator's full configuration (`validator.toml`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// EIP-155 chain id of the coordinator/consensus chain.
    pub chain_id: u64,
    /// The consensus contract.
    pub consensus_address: Address,
    /// The coordinator contract.
    pub coordinator_address: Address,
    /// This validator's own signing address.
    pub self_address: Address,
    /// The default participant set new groups are derived from.
    pub participants: Vec<Participant>,
    /// Salt mixed into the genesis group context.
    #[serde(default)]
    pub genesis_salt: u64,
    /// Epoch length in blocks.
    pub blocks_per_epoch: u64,
    /// Blocks a key-gen phase may wait on peers before reducing the set.
    pub key_gen_timeout_blocks: u64,
    /// Blocks a signing phase may wait before the responsibility rule fires.
    pub signing_timeout_blocks: u64,
    /// Leaves per pre-committed nonce tree; must be a power of two.
    #[serde(default = "default_nonce_tree_size")]
    pub nonce_tree_size: u32,
    /// Remaining-leaf level below which a fresh tree is pre-committed.
    #[serde(default = "default_nonce_low_water_mark")]
    pub nonce_low_water_mark: u32,
    /// Watcher tuning.
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Submitter tuning.
    #[serde(default)]
    pub submitter: SubmitterConfig,
}

impl ValidatorConfig {
    /// This validator's participant id inside the default participant set,
    /// if it is a member.
    pub fn self_participant_id(&self) -> Option<crate::ids::ParticipantId> {
        self.participants.iter().find(|p| p.address == self.self_address).map(|p| p.id)
    }
}

// Path: crates/types/src/chain.rs

//! Light-weight chain-side structures.
//!
//! These are the minimal views of blocks, logs and fees the watcher and the
//! submitter operate on. The full RPC surface lives behind the
//! `sigil-api::chain` traits; the exact on-wire encodings of contract events
//! and calls are opaque to the core.

use alloy_primitives::{Address, Bloom, B256};
use serde::{Deserialize, Serialize};

/// The header fields of one finalised block the watcher cares about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Parent block hash, used for reorg detection.
    pub parent_hash: B256,
    /// The block's log bloom, used to prune empty blocks without a log query.
    pub logs_bloom: Bloom,
}

/// One raw, undecoded contract log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event selector.
    pub topics: Vec<B256>,
    /// ABI-encoded data payload.
    pub data: Vec<u8>,
    /// Block the log was included in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: B256,
    /// Position of the log inside the block.
    pub log_index: u64,
}

/// An EIP-1559 fee estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Cap on the total per-gas fee.
    pub max_fee_per_gas: u128,
    /// Cap on the priority (tip) per-gas fee.
    pub max_priority_fee_per_gas: u128,
}

impl FeeEstimate {
    /// Componentwise maximum of two estimates.
    pub fn max(self, other: FeeEstimate) -> FeeEstimate {
        FeeEstimate {
            max_fee_per_gas: self.max_fee_per_gas.max(other.max_fee_per_gas),
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .max(other.max_priority_fee_per_gas),
        }
    }

    /// Scales both components by `numerator / denominator`, rounding up.
    pub fn bump(self, numerator: u64, denominator: u64) -> FeeEstimate {
        let scale = |v: u128| v.saturating_mul(numerator as u128).div_ceil(denominator as u128);
        FeeEstimate {
            max_fee_per_gas: scale(self.max_fee_per_gas),
            max_priority_fee_per_gas: scale(self.max_priority_fee_per_gas),
        }
    }
}

/// A signed, ready-to-broadcast transaction. The bytes are produced by the
/// per-action encoder and are opaque to the submitter.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction(pub Vec<u8>);

impl std::fmt::Debug for RawTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawTransaction({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_rounds_up() {
        let fees = FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 50 };
        let bumped = fees.bump(101, 100);
        assert_eq!(bumped.max_fee_per_gas, 101);
        assert_eq!(bumped.max_priority_fee_per_gas, 51);
    }

    #[test]
    fn max_is_componentwise() {
        let a = FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 10 };
        let b = FeeEstimate { max_fee_per_gas: 50, max_priority_fee_per_gas: 20 };
        assert_eq!(a.max(b), FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 20 });
    }
}

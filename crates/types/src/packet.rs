// Path: crates/types/src/packet.rs

//! Verified payload kinds.
//!
//! A packet is a typed, semantically validated input whose canonical digest
//! is the message the group ultimately signs. Two kinds exist: epoch-rollover
//! announcements and account-transaction attestations.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// The domain a packet is bound to: the chain and the consensus contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketDomain {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// The consensus contract address.
    pub consensus: Address,
}

/// The call kind of an attested account transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A plain `CALL`.
    Call,
    /// A `DELEGATECALL` into the target.
    DelegateCall,
}

/// The account transaction carried inside an attestation packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransaction {
    /// Chain the transaction executes on.
    pub chain_id: u64,
    /// The account contract executing the transaction.
    pub account: Address,
    /// Call target.
    pub to: Address,
    /// Transferred value in wei.
    pub value: U256,
    /// Calldata; the leading four bytes are the selector.
    pub data: Vec<u8>,
    /// Call or delegatecall.
    pub operation: Operation,
    /// The account's own transaction nonce.
    pub nonce: u64,
}

impl AccountTransaction {
    /// The four-byte calldata selector, if the calldata carries one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
    }
}

/// Announces the handoff from `active_epoch` to `proposed_epoch` at
/// `rollover_block`, carrying the incoming group's public key as affine
/// coordinates (the layout the consensus contract verifies against).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRolloverPacket {
    /// Domain the packet is bound to.
    pub domain: PacketDomain,
    /// The epoch being retired.
    pub active_epoch: u64,
    /// The epoch being staged; always `active_epoch + 1`.
    pub proposed_epoch: u64,
    /// The first block of the proposed epoch.
    pub rollover_block: u64,
    /// X coordinate of the incoming group key.
    pub group_key_x: B256,
    /// Y coordinate of the incoming group key.
    pub group_key_y: B256,
}

/// Wraps an account transaction for attestation under the group that serves
/// `epoch`.
///
/// `tx_hash` is the account-side transaction hash carried for the
/// attestation callback; it is routing data, not part of the canonical
/// digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransactionPacket {
    /// Domain the packet is bound to.
    pub domain: PacketDomain,
    /// Epoch whose group must attest.
    pub epoch: u64,
    /// The account-side transaction hash the attestation will reference.
    pub tx_hash: B256,
    /// The transaction being attested.
    pub transaction: AccountTransaction,
}

/// The closed set of verified payload kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// An epoch-rollover announcement.
    EpochRollover(EpochRolloverPacket),
    /// An account-transaction attestation.
    AccountTransaction(AccountTransactionPacket),
}

impl Packet {
    /// The domain this packet is bound to.
    pub fn domain(&self) -> PacketDomain {
        match self {
            Packet::EpochRollover(p) => p.domain,
            Packet::AccountTransaction(p) => p.domain,
        }
    }
}

// Path: crates/machine/src/verify.rs

//! The verification engine.
//!
//! Given a typed packet, the engine canonicalises it, runs a chain of
//! semantic checks, computes the 32-byte digest, remembers the digest, and
//! returns it. A packet failing any check leaves no trace; the digest set is
//! local to this validator and answers `is_verified` for the `Sign` gate.

use sigil_api::storage::VerifiedDigestStore;
use sigil_crypto::hash;
use sigil_types::error::VerifyError;
use sigil_types::ids::MessageDigest;
use sigil_types::packet::{Operation, Packet, PacketDomain};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// One semantic predicate over a packet. Checks compose as a chain; the
/// first failure wins.
type Check = fn(&PacketVerifier, &Packet, u64) -> Result<(), VerifyError>;

/// The verification engine (one per validator).
pub struct PacketVerifier {
    domain: PacketDomain,
    blocks_per_epoch: u64,
    allowed_selectors: Option<BTreeSet<[u8; 4]>>,
    checks: Vec<Check>,
    digests: Arc<dyn VerifiedDigestStore>,
}

impl PacketVerifier {
    /// Builds the engine with the built-in check chain.
    pub fn new(
        domain: PacketDomain,
        blocks_per_epoch: u64,
        digests: Arc<dyn VerifiedDigestStore>,
    ) -> Self {
        PacketVerifier {
            domain,
            blocks_per_epoch,
            allowed_selectors: None,
            checks: vec![
                check_domain,
                check_operation,
                check_selector,
                check_epoch_sequence,
                check_epoch_boundary,
            ],
            digests,
        }
    }

    /// Restricts account transactions to the given calldata selectors.
    /// Without this every selector passes.
    pub fn with_allowed_selectors(mut self, selectors: BTreeSet<[u8; 4]>) -> Self {
        self.allowed_selectors = Some(selectors);
        self
    }

    /// Verifies a packet against the active epoch, remembers its digest and
    /// returns it.
    pub async fn verify(
        &self,
        packet: &Packet,
        active_epoch: u64,
    ) -> Result<MessageDigest, VerifyError> {
        for check in &self.checks {
            check(self, packet, active_epoch)?;
        }

        let digest = digest_of(packet);
        self.digests
            .insert(&digest)
            .await
            .map_err(|e| VerifyError::Storage(e.to_string()))?;
        debug!(target: "verify", digest = %digest, "packet verified");
        Ok(digest)
    }

    /// Whether this validator has ever verified `digest`.
    pub async fn is_verified(&self, digest: &MessageDigest) -> Result<bool, VerifyError> {
        self.digests
            .contains(digest)
            .await
            .map_err(|e| VerifyError::Storage(e.to_string()))
    }
}

/// The canonical digest of a packet.
pub fn digest_of(packet: &Packet) -> MessageDigest {
    match packet {
        Packet::EpochRollover(p) => hash::epoch_rollover_digest(p),
        Packet::AccountTransaction(p) => hash::account_transaction_digest(p),
    }
}

fn check_domain(v: &PacketVerifier, packet: &Packet, _epoch: u64) -> Result<(), VerifyError> {
    if packet.domain() != v.domain {
        return Err(VerifyError::WrongDomain);
    }
    Ok(())
}

fn check_operation(_v: &PacketVerifier, packet: &Packet, _epoch: u64) -> Result<(), VerifyError> {
    if let Packet::AccountTransaction(p) = packet {
        match p.transaction.operation {
            Operation::Call | Operation::DelegateCall => {}
        }
    }
    Ok(())
}

fn check_selector(v: &PacketVerifier, packet: &Packet, _epoch: u64) -> Result<(), VerifyError> {
    let (Packet::AccountTransaction(p), Some(allowed)) = (packet, &v.allowed_selectors) else {
        return Ok(());
    };
    if p.transaction.data.is_empty() {
        return Ok(());
    }
    let selector = p
        .transaction
        .selector()
        .ok_or_else(|| VerifyError::Malformed("truncated calldata selector".into()))?;
    if !allowed.contains(&selector) {
        return Err(VerifyError::UnsupportedSelector(hex::encode(selector)));
    }
    Ok(())
}

fn check_epoch_sequence(
    _v: &PacketVerifier,
    packet: &Packet,
    active_epoch: u64,
) -> Result<(), VerifyError> {
    if let Packet::EpochRollover(p) = packet {
        if p.active_epoch != active_epoch || p.proposed_epoch != active_epoch + 1 {
            return Err(VerifyError::EpochMismatch {
                expected: active_epoch + 1,
                got: p.proposed_epoch,
            });
        }
    }
    Ok(())
}

fn check_epoch_boundary(
    v: &PacketVerifier,
    packet: &Packet,
    _epoch: u64,
) -> Result<(), VerifyError> {
    if let Packet::EpochRollover(p) = packet {
        if p.rollover_block % v.blocks_per_epoch != 0 {
            return Err(VerifyError::NotOnEpochBoundary(p.rollover_block));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sigil_api::storage::StorageError;
    use sigil_types::packet::{AccountTransaction, AccountTransactionPacket, EpochRolloverPacket};

    #[derive(Default)]
    struct MemDigests(Mutex<BTreeSet<MessageDigest>>);

    #[async_trait]
    impl VerifiedDigestStore for MemDigests {
        async fn insert(&self, digest: &MessageDigest) -> Result<(), StorageError> {
            self.0.lock().insert(*digest);
            Ok(())
        }
        async fn contains(&self, digest: &MessageDigest) -> Result<bool, StorageError> {
            Ok(self.0.lock().contains(digest))
        }
    }

    fn domain() -> PacketDomain {
        PacketDomain { chain_id: 1, consensus: Address::repeat_byte(0xaa) }
    }

    fn verifier() -> PacketVerifier {
        PacketVerifier::new(domain(), 40, Arc::new(MemDigests::default()))
    }

    fn tx_packet() -> Packet {
        Packet::AccountTransaction(AccountTransactionPacket {
            domain: domain(),
            epoch: 1,
            tx_hash: B256::repeat_byte(0x11),
            transaction: AccountTransaction {
                chain_id: 1,
                account: Address::repeat_byte(0xb3),
                to: Address::repeat_byte(0x74),
                value: U256::ZERO,
                data: vec![0x5a, 0xfe, 0x5a, 0xfe],
                operation: Operation::Call,
                nonce: 0,
            },
        })
    }

    #[tokio::test]
    async fn verified_digest_is_remembered() {
        let v = verifier();
        let packet = tx_packet();

        let digest = v.verify(&packet, 1).await.unwrap();
        assert!(v.is_verified(&digest).await.unwrap());
        assert_eq!(digest, digest_of(&packet));
    }

    #[tokio::test]
    async fn failure_leaves_no_trace() {
        let v = verifier();
        let mut packet = tx_packet();
        if let Packet::AccountTransaction(p) = &mut packet {
            p.domain.chain_id = 2;
        }

        let digest = digest_of(&packet);
        assert!(matches!(v.verify(&packet, 1).await, Err(VerifyError::WrongDomain)));
        assert!(!v.is_verified(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn selector_allow_list_is_enforced() {
        let v = verifier().with_allowed_selectors(BTreeSet::from([[0xde, 0xad, 0xbe, 0xef]]));
        assert!(matches!(
            v.verify(&tx_packet(), 1).await,
            Err(VerifyError::UnsupportedSelector(_))
        ));
    }

    #[tokio::test]
    async fn rollover_must_propose_next_epoch() {
        let v = verifier();
        let packet = Packet::EpochRollover(EpochRolloverPacket {
            domain: domain(),
            active_epoch: 1,
            proposed_epoch: 3,
            rollover_block: 80,
            group_key_x: B256::ZERO,
            group_key_y: B256::ZERO,
        });
        assert!(matches!(
            v.verify(&packet, 1).await,
            Err(VerifyError::EpochMismatch { expected: 2, got: 3 })
        ));
    }

    #[tokio::test]
    async fn rollover_block_must_sit_on_boundary() {
        let v = verifier();
        let packet = Packet::EpochRollover(EpochRolloverPacket {
            domain: domain(),
            active_epoch: 1,
            proposed_epoch: 2,
            rollover_block: 81,
            group_key_x: B256::ZERO,
            group_key_y: B256::ZERO,
        });
        assert!(matches!(
            v.verify(&packet, 1).await,
            Err(VerifyError::NotOnEpochBoundary(81))
        ));
    }
}

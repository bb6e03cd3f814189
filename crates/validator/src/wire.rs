// Path: crates/validator/src/wire.rs

//! The reference wire schema.
//!
//! The coordinator/consensus ABIs are opaque to the core; this module is the
//! deployment seam. The reference codec pairs each event kind with a
//! keccak-derived selector and carries the canonically encoded event in the
//! log data, which is the format the development chain and the test
//! harness speak.
//! A production deployment substitutes implementations bound to the real
//! contract ABIs and a hardware-backed transaction signer; nothing outside
//! this module changes.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use sigil_api::chain::{ActionEncoder, LogCodec, WireError};
use sigil_crypto::hash::keccak;
use sigil_types::action::Action;
use sigil_types::chain::{FeeEstimate, LogEntry, RawTransaction};
use sigil_types::codec::{from_bytes_canonical, to_bytes_canonical};
use sigil_types::event::{ChainEvent, EventKind};

/// The reference log codec: selector = `keccak("sigil/v1/event/<Name>")`,
/// data = canonical event bytes.
pub struct CanonicalLogCodec {
    coordinator: Address,
    consensus: Address,
}

impl CanonicalLogCodec {
    /// Builds the codec for a contract pair.
    pub fn new(coordinator: Address, consensus: Address) -> Self {
        CanonicalLogCodec { coordinator, consensus }
    }
}

impl LogCodec for CanonicalLogCodec {
    fn watched_addresses(&self) -> Vec<Address> {
        vec![self.coordinator, self.consensus]
    }

    fn selector(&self, kind: EventKind) -> B256 {
        B256::from(keccak(&[b"sigil/v1/event/", kind.name().as_bytes()]))
    }

    fn kind_of(&self, topic0: &B256) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| self.selector(*kind) == *topic0)
    }

    fn decode(&self, log: &LogEntry) -> Result<Option<ChainEvent>, WireError> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let Some(kind) = self.kind_of(topic0) else {
            return Ok(None);
        };
        let event: ChainEvent = from_bytes_canonical(&log.data)
            .map_err(|e| WireError::Decode { kind: kind.name(), reason: e.to_string() })?;
        if event.kind() != kind {
            return Err(WireError::Decode {
                kind: kind.name(),
                reason: "selector does not match payload kind".into(),
            });
        }
        Ok(Some(event))
    }
}

/// The reference action encoder: the signed transaction is the canonical
/// encoding of `(sender, nonce, fees, action)`, accepted by the development
/// chain's intake.
pub struct CanonicalActionEncoder {
    sender: Address,
}

impl CanonicalActionEncoder {
    /// Builds an encoder for the signing identity.
    pub fn new(sender: Address) -> Self {
        CanonicalActionEncoder { sender }
    }
}

#[async_trait]
impl ActionEncoder for CanonicalActionEncoder {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn encode(
        &self,
        action: &Action,
        nonce: u64,
        fees: FeeEstimate,
    ) -> Result<RawTransaction, WireError> {
        let payload = (self.sender, nonce, fees, action);
        let bytes =
            to_bytes_canonical(&payload).map_err(|e| WireError::Encode(e.to_string()))?;
        Ok(RawTransaction(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_types::ids::MessageDigest;

    fn codec() -> CanonicalLogCodec {
        CanonicalLogCodec::new(Address::repeat_byte(1), Address::repeat_byte(2))
    }

    fn wrap(codec: &CanonicalLogCodec, event: &ChainEvent) -> LogEntry {
        LogEntry {
            address: Address::repeat_byte(1),
            topics: vec![codec.selector(event.kind())],
            data: to_bytes_canonical(event).unwrap(),
            block_number: 3,
            block_hash: B256::repeat_byte(3),
            log_index: 0,
        }
    }

    #[test]
    fn selectors_are_distinct() {
        let codec = codec();
        let mut seen = std::collections::BTreeSet::new();
        for kind in EventKind::ALL {
            assert!(seen.insert(codec.selector(kind)));
            assert_eq!(codec.kind_of(&codec.selector(kind)), Some(kind));
        }
    }

    #[test]
    fn decode_roundtrip() {
        let codec = codec();
        let event = ChainEvent::TransactionAttested { message: MessageDigest([7; 32]) };
        let log = wrap(&codec, &event);
        assert_eq!(codec.decode(&log).unwrap(), Some(event));
    }

    #[test]
    fn unknown_selector_is_skipped() {
        let codec = codec();
        let mut log = wrap(&codec, &ChainEvent::TransactionAttested {
            message: MessageDigest([7; 32]),
        });
        log.topics = vec![B256::repeat_byte(0xee)];
        assert_eq!(codec.decode(&log).unwrap(), None);
    }

    #[test]
    fn mismatched_payload_is_an_error() {
        let codec = codec();
        let event = ChainEvent::TransactionAttested { message: MessageDigest([7; 32]) };
        let mut log = wrap(&codec, &event);
        log.topics = vec![codec.selector(EventKind::SignCompleted)];
        assert!(codec.decode(&log).is_err());
    }
}

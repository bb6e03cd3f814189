// Path: crates/types/src/ids.rs

//! Opaque identifiers and small wire primitives shared across the protocol.

use alloy_primitives::FixedBytes;
use serde::{Deserialize, Serialize};

/// A participant's index inside a group. Strictly positive; `0` is never a
/// valid id and is rejected wherever participants are constructed.
pub type ParticipantId = u16;

/// A compressed SEC1 curve point (33 bytes) as carried on the wire.
pub type CompressedPoint = FixedBytes<33>;

/// A 32-byte big-endian scalar as carried on the wire.
pub type ScalarBytes = FixedBytes<32>;

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub [u8; 32]);

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(&self.0[..8]))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(v: [u8; 32]) -> Self {
                Self(v)
            }
        }
    };
}

opaque_id!(
    /// Identifies one group: `H(participants_root, count, threshold, context)`.
    GroupId
);
opaque_id!(
    /// Identifies one in-flight signature on the coordinator contract.
    SignatureId
);
opaque_id!(
    /// The canonical 32-byte digest of a verified packet.
    MessageDigest
);
opaque_id!(
    /// A stable hash of an [`crate::action::Action`], used for outbox
    /// bookkeeping and log correlation.
    ActionId
);

/// A Schnorr proof of knowledge over a key-gen constant term: `(R, μ)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrPok {
    /// The prover's nonce commitment `R = r·G`.
    pub r: CompressedPoint,
    /// The response scalar `μ = r + c·a₀`.
    pub mu: ScalarBytes,
}

/// A completed group Schnorr signature `(R, z)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature {
    /// The group commitment point.
    pub r: CompressedPoint,
    /// The aggregated response scalar.
    pub z: ScalarBytes,
}

/// A Merkle membership proof: the leaf position and the sibling path from
/// the leaf up to (but excluding) the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The index of the proven leaf.
    pub leaf_index: u32,
    /// Sibling hashes, leaf level first.
    pub path: Vec<FixedBytes<32>>,
}

/// Packs a nonce-tree position `(chunk, offset)` into the on-wire sequence.
#[inline]
pub fn encode_sequence(chunk: u32, offset: u32) -> u64 {
    (u64::from(chunk) << 32) | u64::from(offset)
}

/// Splits an on-wire sequence back into its `(chunk, offset)` position.
#[inline]
pub fn decode_sequence(sequence: u64) -> (u32, u32) {
    ((sequence >> 32) as u32, sequence as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_roundtrip() {
        for (chunk, offset) in [(0, 0), (1, 0), (0, 1), (7, 1023), (u32::MAX, u32::MAX)] {
            assert_eq!(decode_sequence(encode_sequence(chunk, offset)), (chunk, offset));
        }
    }

    #[test]
    fn opaque_id_debug_is_hex() {
        let id = GroupId([0xab; 32]);
        assert!(format!("{:?}", id).starts_with("GroupId(abab"));
    }
}

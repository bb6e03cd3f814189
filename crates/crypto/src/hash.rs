// Path: crates/crypto/src/hash.rs

//! Keccak-256 hash domains.
//!
//! Every protocol hash starts with an ASCII domain tag. These constants are
//! protocol-critical: an on-chain verifier must reproduce them bit-for-bit,
//! so they all live in this one module and nowhere else.

use crate::point::{Point, Scalar};
use alloy_primitives::B256;
use k256::elliptic_curve::ops::Reduce;
use k256::U256 as CurveWords;
use sha3::{Digest, Keccak256};
use sigil_types::action::Action;
use sigil_types::codec::to_bytes_canonical;
use sigil_types::error::CodecError;
use sigil_types::group::GroupContext;
use sigil_types::ids::{ActionId, GroupId, MessageDigest};
use sigil_types::packet::{AccountTransactionPacket, EpochRolloverPacket, Operation};

/// Tag for group-id derivation.
pub const DOM_GROUP_ID: &[u8] = b"sigil/v1/group-id";
/// Tag for group-context digests.
pub const DOM_CONTEXT: &[u8] = b"sigil/v1/context";
/// Tag for participant Merkle leaves.
pub const DOM_PARTICIPANT_LEAF: &[u8] = b"sigil/v1/participant-leaf";
/// Tag for interior Merkle nodes.
pub const DOM_NODE: &[u8] = b"sigil/v1/node";
/// Tag for nonce-tree leaves.
pub const DOM_NONCE_LEAF: &[u8] = b"sigil/v1/nonce-leaf";
/// Tag for key-gen proofs of knowledge.
pub const DOM_POK: &[u8] = b"sigil/v1/pok";
/// Tag for FROST binding factors.
pub const DOM_RHO: &[u8] = b"sigil/v1/rho";
/// Tag for the Schnorr challenge.
pub const DOM_CHAL: &[u8] = b"sigil/v1/chal";
/// Tag for peer-share encryption keys.
pub const DOM_SHARE_KEY: &[u8] = b"sigil/v1/share-key";
/// Tag for peer-share encryption nonces.
pub const DOM_SHARE_NONCE: &[u8] = b"sigil/v1/share-nonce";
/// Tag for epoch-rollover packet digests.
pub const DOM_PACKET_ROLLOVER: &[u8] = b"sigil/v1/packet/epoch-rollover";
/// Tag for account-transaction packet digests.
pub const DOM_PACKET_ACCOUNT_TX: &[u8] = b"sigil/v1/packet/account-tx";
/// Tag for action ids.
pub const DOM_ACTION_ID: &[u8] = b"sigil/v1/action-id";

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hashes to a scalar by reducing the digest mod the group order.
///
/// The reduction bias is negligible for secp256k1 and matches what the
/// on-chain verifier computes.
pub fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let digest = keccak(parts);
    <Scalar as Reduce<CurveWords>>::reduce(CurveWords::from_be_slice(&digest))
}

/// The digest of a group context.
pub fn context_digest(context: &GroupContext) -> [u8; 32] {
    keccak(&[
        DOM_CONTEXT,
        context.consensus.as_slice(),
        &context.epoch.to_be_bytes(),
        &context.salt.to_be_bytes(),
    ])
}

/// Derives a group id: `H(participants_root, count, threshold, context)`.
pub fn group_id(
    participants_root: &B256,
    count: u16,
    threshold: u16,
    context: &GroupContext,
) -> GroupId {
    GroupId(keccak(&[
        DOM_GROUP_ID,
        participants_root.as_slice(),
        &count.to_be_bytes(),
        &threshold.to_be_bytes(),
        &context_digest(context),
    ]))
}

/// The canonical digest of an epoch-rollover packet.
pub fn epoch_rollover_digest(packet: &EpochRolloverPacket) -> MessageDigest {
    MessageDigest(keccak(&[
        DOM_PACKET_ROLLOVER,
        &packet.domain.chain_id.to_be_bytes(),
        packet.domain.consensus.as_slice(),
        &packet.active_epoch.to_be_bytes(),
        &packet.proposed_epoch.to_be_bytes(),
        &packet.rollover_block.to_be_bytes(),
        packet.group_key_x.as_slice(),
        packet.group_key_y.as_slice(),
    ]))
}

/// The canonical digest of an account-transaction packet. The calldata is
/// hashed first so the preimage stays fixed-width.
pub fn account_transaction_digest(packet: &AccountTransactionPacket) -> MessageDigest {
    let tx = &packet.transaction;
    let operation = match tx.operation {
        Operation::Call => [0u8],
        Operation::DelegateCall => [1u8],
    };
    MessageDigest(keccak(&[
        DOM_PACKET_ACCOUNT_TX,
        &packet.domain.chain_id.to_be_bytes(),
        packet.domain.consensus.as_slice(),
        &packet.epoch.to_be_bytes(),
        &tx.chain_id.to_be_bytes(),
        tx.account.as_slice(),
        tx.to.as_slice(),
        &tx.value.to_be_bytes::<32>(),
        &keccak(&[&tx.data]),
        &operation,
        &tx.nonce.to_be_bytes(),
    ]))
}

/// A stable hash of an action, used as its outbox id.
pub fn action_id(action: &Action) -> Result<ActionId, CodecError> {
    let bytes = to_bytes_canonical(action)?;
    Ok(ActionId(keccak(&[DOM_ACTION_ID, &bytes])))
}

/// The Schnorr challenge `c = H("chal" ‖ R ‖ group_pub ‖ message)`.
pub fn challenge(group_commitment: &Point, group_public: &Point, message: &[u8; 32]) -> Scalar {
    hash_to_scalar(&[
        DOM_CHAL,
        crate::point::encode_point(group_commitment).as_slice(),
        crate::point::encode_point(group_public).as_slice(),
        message,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    #[test]
    fn group_id_depends_on_every_input() {
        let root = B256::repeat_byte(1);
        let context = GroupContext { consensus: Address::repeat_byte(2), epoch: 1, salt: 0 };
        let base = group_id(&root, 3, 2, &context);

        assert_ne!(base, group_id(&B256::repeat_byte(9), 3, 2, &context));
        assert_ne!(base, group_id(&root, 4, 2, &context));
        assert_ne!(base, group_id(&root, 3, 3, &context));
        assert_ne!(
            base,
            group_id(&root, 3, 2, &GroupContext { epoch: 2, ..context })
        );
        assert_ne!(
            base,
            group_id(&root, 3, 2, &GroupContext { salt: 1, ..context })
        );
    }

    #[test]
    fn hash_to_scalar_is_deterministic() {
        assert_eq!(hash_to_scalar(&[b"abc"]), hash_to_scalar(&[b"abc"]));
        assert_ne!(hash_to_scalar(&[b"abc"]), hash_to_scalar(&[b"abd"]));
    }
}

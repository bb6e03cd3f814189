// Path: crates/types/src/group.rs

//! Participants, groups, and the context a group is derived from.

use crate::ids::{CompressedPoint, GroupId, ParticipantId, ScalarBytes};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// One validator identity inside a group: `(id, address)`.
///
/// Participants are deterministically ordered by `id`; the participants root
/// and therefore the group id are stable under input reordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Participant {
    /// The participant's index, unique and strictly positive inside a group.
    pub id: ParticipantId,
    /// The participant's 20-byte account address.
    pub address: Address,
}

/// Sorts participants by id and rejects zero or duplicate ids.
pub fn normalize_participants(mut participants: Vec<Participant>) -> Option<Vec<Participant>> {
    participants.sort_by_key(|p| p.id);
    if participants.is_empty() || participants[0].id == 0 {
        return None;
    }
    if participants.windows(2).any(|w| w[0].id == w[1].id) {
        return None;
    }
    Some(participants)
}

/// The context a group is bound to: which consensus contract it serves,
/// which epoch it is being created for, and the genesis salt (zero for all
/// non-genesis groups).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContext {
    /// The consensus contract this group signs for.
    pub consensus: Address,
    /// The epoch the group will serve once confirmed.
    pub epoch: u64,
    /// Distinguishes genesis deployments sharing a participant set.
    pub salt: u64,
}

/// One signing group as persisted by this validator.
///
/// The secret `signing_share` is only ever set for a confirmed group this
/// validator belongs to; it never leaves the storage layer except as an
/// opaque scalar handed to the signing client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// The group's derived identifier.
    pub id: GroupId,
    /// Members, ordered by participant id.
    pub participants: Vec<Participant>,
    /// Merkle root over the `(id, address)` leaves.
    pub participants_root: B256,
    /// Minimum number of signers needed for a signature.
    pub threshold: u16,
    /// The context the group was derived with.
    pub context: GroupContext,
    /// The aggregate public key; unset until key-gen confirms.
    pub public_key: Option<CompressedPoint>,
    /// This validator's id inside the group, if it is a member.
    pub self_id: Option<ParticipantId>,
    /// This validator's secret signing share (set on confirmation).
    pub signing_share: Option<ScalarBytes>,
    /// This validator's public verification share (set on confirmation).
    pub verification_share: Option<CompressedPoint>,
}

impl Group {
    /// Looks a member up by id.
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// The ids of every member, in order.
    pub fn participant_ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().map(|p| p.id)
    }

    /// Number of members.
    pub fn count(&self) -> u16 {
        self.participants.len() as u16
    }
}

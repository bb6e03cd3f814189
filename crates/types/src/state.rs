// Path: crates/types/src/state.rs

//! The three protocol sub-states and the structured diff that advances them.
//!
//! All states are closed, tagged variants; handlers match exhaustively. The
//! machine never mutates state in place; it emits a [`StateDiff`] so a
//! transition's entire effect can be applied in one atomic storage write.

use crate::ids::{GroupId, MessageDigest, ParticipantId, SignatureId};
use crate::packet::Packet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Drives this validator's key-gen rollover; exactly one instance exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloverState {
    /// No genesis group exists yet; waiting for the genesis trigger.
    WaitingForGenesis,
    /// An epoch's group is active; waiting for the next epoch boundary.
    WaitingForRollover,
    /// Key-gen for `next_epoch` failed below threshold; the previous group
    /// stays authoritative until the following boundary.
    EpochSkipped {
        /// The epoch whose key-gen was abandoned.
        next_epoch: u64,
    },
    /// A ceremony is open; collecting coefficient commitments.
    CollectingCommitments {
        /// Ceremony group.
        group_id: GroupId,
        /// Epoch the group will serve.
        next_epoch: u64,
        /// Block after which missing committers are dropped.
        deadline: u64,
    },
    /// Commitments complete; collecting encrypted shares.
    CollectingShares {
        /// Ceremony group.
        group_id: GroupId,
        /// Epoch the group will serve.
        next_epoch: u64,
        /// Block after which missing sharers are dropped.
        deadline: u64,
        /// Participants currently under complaint.
        complaints: BTreeSet<ParticipantId>,
        /// Participants that have not shared yet.
        missing_shares_from: BTreeSet<ParticipantId>,
        /// The participant whose share batch completed the phase.
        last_participant: Option<ParticipantId>,
    },
    /// Shares complete; collecting confirmations (and complaint responses).
    CollectingConfirmations {
        /// Ceremony group.
        group_id: GroupId,
        /// Epoch the group will serve.
        next_epoch: u64,
        /// Participants currently under complaint.
        complaints: BTreeSet<ParticipantId>,
        /// Block by which complaints must be filed.
        complaint_deadline: u64,
        /// Block by which accused participants must respond.
        response_deadline: u64,
        /// Block after which missing confirmers are dropped.
        deadline: u64,
        /// The participant whose event completed the previous phase.
        last_participant: Option<ParticipantId>,
        /// Participants whose shares never arrived.
        missing_shares_from: BTreeSet<ParticipantId>,
        /// Participants that have confirmed.
        confirmations_from: BTreeSet<ParticipantId>,
    },
    /// The group is confirmed; the rollover packet is being signed.
    SignRollover {
        /// The confirmed incoming group.
        group_id: GroupId,
        /// Epoch the group will serve.
        next_epoch: u64,
        /// Digest of the rollover packet under signature.
        message: MessageDigest,
    },
    /// The rollover signature completed; waiting for the chain to stage it.
    EpochStaged {
        /// The staged epoch.
        next_epoch: u64,
    },
}

/// The discriminant of one in-flight signing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningPhase {
    /// A verified packet exists; waiting for the consensus contract's
    /// `Sign` request.
    WaitingForRequest {
        /// Who is expected to submit the `SignRequest`; `None` = everyone.
        responsible: Option<ParticipantId>,
        /// The signer set the request will use.
        signers: BTreeSet<ParticipantId>,
        /// Block after which the responsibility rule applies.
        deadline: u64,
    },
    /// A request is open; collecting revealed nonce commitments.
    CollectNonceCommitments {
        /// The open request.
        signature_id: SignatureId,
        /// The signer whose reveal completed so far.
        last_signer: Option<ParticipantId>,
        /// Block after which missing signers are dropped.
        deadline: u64,
    },
    /// Nonces complete; collecting signature shares.
    CollectSigningShares {
        /// The open request.
        signature_id: SignatureId,
        /// Signers whose shares have arrived.
        shares_from: BTreeSet<ParticipantId>,
        /// The most recent signer to publish a share.
        last_signer: Option<ParticipantId>,
        /// Block after which missing signers are dropped.
        deadline: u64,
    },
    /// The signature completed; waiting for the terminal callback
    /// (stage-epoch or attest-transaction) to land on chain.
    WaitingForAttestation {
        /// The completed request.
        signature_id: SignatureId,
        /// Who is expected to submit the callback; `None` = everyone.
        responsible: Option<ParticipantId>,
        /// Block after which the responsibility rule applies.
        deadline: u64,
    },
}

/// One in-flight signing entry, keyed by its message digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningState {
    /// The verified packet the digest was derived from.
    pub packet: Packet,
    /// Where the entry is in its life cycle.
    pub phase: SigningPhase,
}

/// The group serving one epoch, with this validator's id inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochGroup {
    /// The authoritative group.
    pub group_id: GroupId,
    /// This validator's participant id in that group.
    pub participant_id: ParticipantId,
}

/// Mutable consensus-wide bookkeeping replicated by every validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableConsensusState {
    /// The genesis group, once one has confirmed.
    pub genesis_group_id: Option<GroupId>,
    /// The currently authoritative epoch.
    pub active_epoch: u64,
    /// Which group serves which epoch.
    pub epoch_groups: BTreeMap<u64, EpochGroup>,
    /// Groups with an unacknowledged nonce-tree commitment in flight.
    pub group_pending_nonces: BTreeSet<GroupId>,
    /// Maps open signature ids back to their message digests.
    pub signature_to_message: BTreeMap<SignatureId, MessageDigest>,
}

impl MutableConsensusState {
    /// The group serving `epoch`, if one is recorded.
    pub fn group_for_epoch(&self, epoch: u64) -> Option<EpochGroup> {
        self.epoch_groups.get(&epoch).copied()
    }
}

/// Structured additions/removals over the three sub-states, produced by one
/// transition and applied in a single atomic storage write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    /// Replacement rollover state, if it changed.
    pub rollover: Option<RolloverState>,
    /// Signing entries created or replaced, keyed by digest.
    pub signing_upserts: BTreeMap<MessageDigest, SigningState>,
    /// Signing entries removed.
    pub signing_removals: BTreeSet<MessageDigest>,
    /// Replacement consensus state, if it changed.
    pub consensus: Option<MutableConsensusState>,
}

impl StateDiff {
    /// True when the diff carries no change at all.
    pub fn is_empty(&self) -> bool {
        self.rollover.is_none()
            && self.signing_upserts.is_empty()
            && self.signing_removals.is_empty()
            && self.consensus.is_none()
    }

    /// Folds `other` into `self`; later writes win, and an upsert of a digest
    /// cancels an earlier removal of the same digest (and vice versa).
    pub fn merge(&mut self, other: StateDiff) {
        if other.rollover.is_some() {
            self.rollover = other.rollover;
        }
        if other.consensus.is_some() {
            self.consensus = other.consensus;
        }
        for digest in other.signing_removals {
            self.signing_upserts.remove(&digest);
            self.signing_removals.insert(digest);
        }
        for (digest, entry) in other.signing_upserts {
            self.signing_removals.remove(&digest);
            self.signing_upserts.insert(digest, entry);
        }
    }
}

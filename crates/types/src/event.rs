// Path: crates/types/src/event.rs

//! Decoded chain events and the ordered transition stream they form.

use crate::group::GroupContext;
use crate::ids::{
    CompressedPoint, GroupId, MessageDigest, ParticipantId, ScalarBytes, SchnorrPok,
    SchnorrSignature, SignatureId,
};
use crate::packet::AccountTransaction;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A decoded coordinator/consensus contract event.
///
/// Field shapes follow the protocol data model; the ABI-level encoding is the
/// log codec's concern and never leaks past the watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A key-gen ceremony was opened on the coordinator.
    KeyGen {
        /// The derived group id.
        group_id: GroupId,
        /// Merkle root over the `(id, address)` participant leaves.
        participants_root: B256,
        /// Number of participants.
        count: u16,
        /// Signing threshold.
        threshold: u16,
        /// The decoded group context (consensus address, epoch, salt).
        context: GroupContext,
    },
    /// A participant published its coefficient commitments.
    KeyGenCommitted {
        /// Ceremony group.
        group_id: GroupId,
        /// The committing participant.
        participant: ParticipantId,
        /// Commitments `cⱼ = coeffⱼ·G`, constant term first.
        commitments: Vec<CompressedPoint>,
        /// Schnorr proof of knowledge over the constant term.
        pok: SchnorrPok,
        /// True on the commitment that completes the phase.
        committed: bool,
    },
    /// A participant published its encrypted shares.
    KeyGenSecretShared {
        /// Ceremony group.
        group_id: GroupId,
        /// The sharing participant.
        participant: ParticipantId,
        /// The sharer's public verification share.
        verification_share: CompressedPoint,
        /// Per-recipient encrypted polynomial evaluations.
        encrypted_shares: BTreeMap<ParticipantId, Vec<u8>>,
        /// True on the share batch that completes the phase.
        shared: bool,
    },
    /// A participant complained about an invalid share.
    KeyGenComplained {
        /// Ceremony group.
        group_id: GroupId,
        /// Who complained.
        plaintiff: ParticipantId,
        /// Who the complaint is against.
        accused: ParticipantId,
    },
    /// A complained-against participant published the plaintext share.
    KeyGenComplaintResponded {
        /// Ceremony group.
        group_id: GroupId,
        /// The participant answering the complaint.
        accused: ParticipantId,
        /// The original plaintiff.
        plaintiff: ParticipantId,
        /// The disputed share in the clear.
        plaintext_share: ScalarBytes,
    },
    /// A participant confirmed the ceremony outcome.
    KeyGenConfirmed {
        /// Ceremony group.
        group_id: GroupId,
        /// The confirming participant.
        participant: ParticipantId,
        /// True on the confirmation that completes the ceremony.
        confirmed: bool,
    },
    /// A nonce-tree commitment was acknowledged and bound to a chunk.
    Preprocess {
        /// The group the tree belongs to.
        group_id: GroupId,
        /// The participant that committed the tree.
        participant: ParticipantId,
        /// The chunk index the tree root was bound to.
        chunk: u32,
        /// The committed nonce-tree root.
        commitment: B256,
    },
    /// The consensus contract requested a signature.
    Sign {
        /// Who initiated the request; must be the consensus contract.
        initiator: Address,
        /// The group asked to sign.
        group_id: GroupId,
        /// The digest to sign.
        message: MessageDigest,
        /// The request's signature id.
        signature_id: SignatureId,
        /// Packed `(chunk, offset)` into the group's nonce trees.
        sequence: u64,
    },
    /// A signer revealed its one-time nonce commitments for a request.
    SignRevealedNonces {
        /// The signature being produced.
        signature_id: SignatureId,
        /// The revealing signer.
        participant: ParticipantId,
        /// Hiding commitment `D`.
        hiding: CompressedPoint,
        /// Binding commitment `E`.
        binding: CompressedPoint,
    },
    /// A signer published its signature share.
    SignShared {
        /// The signature being produced.
        signature_id: SignatureId,
        /// The publishing signer.
        participant: ParticipantId,
        /// The signer's response scalar `zᵢ`.
        share: ScalarBytes,
    },
    /// The coordinator aggregated a full group signature.
    SignCompleted {
        /// The completed request.
        signature_id: SignatureId,
        /// The aggregate Schnorr signature.
        signature: SchnorrSignature,
    },
    /// An epoch rollover was proposed on the consensus contract.
    EpochProposed {
        /// The epoch being retired.
        active_epoch: u64,
        /// The epoch being proposed.
        proposed_epoch: u64,
        /// First block of the proposed epoch.
        rollover_block: u64,
    },
    /// An epoch rollover was staged with a valid group signature.
    EpochStaged {
        /// The epoch that was retired.
        active_epoch: u64,
        /// The epoch now active.
        proposed_epoch: u64,
        /// First block of the new epoch.
        rollover_block: u64,
    },
    /// An account transaction was proposed for attestation.
    TransactionProposed {
        /// The canonical digest the group will sign.
        message: MessageDigest,
        /// The account-level transaction hash.
        tx_hash: B256,
        /// Epoch whose group must attest.
        epoch: u64,
        /// The proposed transaction.
        tx: AccountTransaction,
    },
    /// A proposed transaction received its attestation.
    TransactionAttested {
        /// The digest that was attested.
        message: MessageDigest,
    },
}

/// The fieldless discriminant of [`ChainEvent`], used for selector
/// registries and the fallible-event allow-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// See [`ChainEvent::KeyGen`].
    KeyGen,
    /// See [`ChainEvent::KeyGenCommitted`].
    KeyGenCommitted,
    /// See [`ChainEvent::KeyGenSecretShared`].
    KeyGenSecretShared,
    /// See [`ChainEvent::KeyGenComplained`].
    KeyGenComplained,
    /// See [`ChainEvent::KeyGenComplaintResponded`].
    KeyGenComplaintResponded,
    /// See [`ChainEvent::KeyGenConfirmed`].
    KeyGenConfirmed,
    /// See [`ChainEvent::Preprocess`].
    Preprocess,
    /// See [`ChainEvent::Sign`].
    Sign,
    /// See [`ChainEvent::SignRevealedNonces`].
    SignRevealedNonces,
    /// See [`ChainEvent::SignShared`].
    SignShared,
    /// See [`ChainEvent::SignCompleted`].
    SignCompleted,
    /// See [`ChainEvent::EpochProposed`].
    EpochProposed,
    /// See [`ChainEvent::EpochStaged`].
    EpochStaged,
    /// See [`ChainEvent::TransactionProposed`].
    TransactionProposed,
    /// See [`ChainEvent::TransactionAttested`].
    TransactionAttested,
}

impl EventKind {
    /// Every decodable event kind, in declaration order.
    pub const ALL: [EventKind; 15] = [
        EventKind::KeyGen,
        EventKind::KeyGenCommitted,
        EventKind::KeyGenSecretShared,
        EventKind::KeyGenComplained,
        EventKind::KeyGenComplaintResponded,
        EventKind::KeyGenConfirmed,
        EventKind::Preprocess,
        EventKind::Sign,
        EventKind::SignRevealedNonces,
        EventKind::SignShared,
        EventKind::SignCompleted,
        EventKind::EpochProposed,
        EventKind::EpochStaged,
        EventKind::TransactionProposed,
        EventKind::TransactionAttested,
    ];

    /// A stable name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::KeyGen => "KeyGen",
            EventKind::KeyGenCommitted => "KeyGenCommitted",
            EventKind::KeyGenSecretShared => "KeyGenSecretShared",
            EventKind::KeyGenComplained => "KeyGenComplained",
            EventKind::KeyGenComplaintResponded => "KeyGenComplaintResponded",
            EventKind::KeyGenConfirmed => "KeyGenConfirmed",
            EventKind::Preprocess => "Preprocess",
            EventKind::Sign => "Sign",
            EventKind::SignRevealedNonces => "SignRevealedNonces",
            EventKind::SignShared => "SignShared",
            EventKind::SignCompleted => "SignCompleted",
            EventKind::EpochProposed => "EpochProposed",
            EventKind::EpochStaged => "EpochStaged",
            EventKind::TransactionProposed => "TransactionProposed",
            EventKind::TransactionAttested => "TransactionAttested",
        }
    }
}

impl ChainEvent {
    /// The event's kind discriminant.
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::KeyGen { .. } => EventKind::KeyGen,
            ChainEvent::KeyGenCommitted { .. } => EventKind::KeyGenCommitted,
            ChainEvent::KeyGenSecretShared { .. } => EventKind::KeyGenSecretShared,
            ChainEvent::KeyGenComplained { .. } => EventKind::KeyGenComplained,
            ChainEvent::KeyGenComplaintResponded { .. } => EventKind::KeyGenComplaintResponded,
            ChainEvent::KeyGenConfirmed { .. } => EventKind::KeyGenConfirmed,
            ChainEvent::Preprocess { .. } => EventKind::Preprocess,
            ChainEvent::Sign { .. } => EventKind::Sign,
            ChainEvent::SignRevealedNonces { .. } => EventKind::SignRevealedNonces,
            ChainEvent::SignShared { .. } => EventKind::SignShared,
            ChainEvent::SignCompleted { .. } => EventKind::SignCompleted,
            ChainEvent::EpochProposed { .. } => EventKind::EpochProposed,
            ChainEvent::EpochStaged { .. } => EventKind::EpochStaged,
            ChainEvent::TransactionProposed { .. } => EventKind::TransactionProposed,
            ChainEvent::TransactionAttested { .. } => EventKind::TransactionAttested,
        }
    }
}

/// One element of the canonical, ordered transition stream the machine
/// consumes. Ordered by `(block, log_index)`, ticks first within a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// A newly finalised block.
    BlockTick {
        /// The finalised block number.
        block: u64,
    },
    /// One accepted contract log.
    Event {
        /// Block the event was included in.
        block: u64,
        /// Position of the log inside the block.
        log_index: u64,
        /// The decoded event.
        event: ChainEvent,
    },
}

impl Transition {
    /// The `(block, log_index)` ordering key. Ticks sort before any event of
    /// the same block.
    pub fn position(&self) -> (u64, u64) {
        match self {
            Transition::BlockTick { block } => (*block, 0),
            Transition::Event { block, log_index, .. } => (*block, log_index + 1),
        }
    }

    /// The block this transition belongs to.
    pub fn block(&self) -> u64 {
        match self {
            Transition::BlockTick { block } => *block,
            Transition::Event { block, .. } => *block,
        }
    }
}

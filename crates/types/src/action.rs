// Path: crates/types/src/action.rs

//! Commands emitted by the state machine.
//!
//! The machine never talks to the chain; it emits [`Action`] values and the
//! submitter turns them into signed transactions. Every action names its
//! target contract; the payload shapes mirror the coordinator/consensus call
//! surface without fixing an ABI.

use crate::group::{GroupContext, Participant};
use crate::ids::{
    CompressedPoint, GroupId, MerkleProof, MessageDigest, ParticipantId, ScalarBytes, SchnorrPok,
    SignatureId,
};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which contract an action is submitted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// The key-gen/signing coordinator contract.
    Coordinator,
    /// The consensus contract.
    Consensus,
}

/// Opaque routing context carried on a `PublishSignatureShare` so the
/// consensus contract can forward the completed signature to the intended
/// callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackContext {
    /// Route the signature into `StageEpoch`.
    StageEpoch {
        /// The epoch being staged.
        proposed_epoch: u64,
        /// First block of the staged epoch.
        rollover_block: u64,
        /// The incoming group.
        group_id: GroupId,
    },
    /// Route the signature into `AttestTransaction`.
    AttestTransaction {
        /// Epoch whose group attested.
        epoch: u64,
        /// The attested transaction hash.
        tx_hash: B256,
    },
}

/// A high-level command for the submitter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Open a key-gen ceremony and publish this validator's commitments.
    KeyGenStart {
        /// Merkle root over the participant leaves.
        participants_root: B256,
        /// The full (ordered) participant set the root commits to.
        participants: Vec<Participant>,
        /// Participant count.
        count: u16,
        /// Signing threshold.
        threshold: u16,
        /// Context the group is derived with.
        context: GroupContext,
        /// This validator's id inside the set.
        self_id: ParticipantId,
        /// Coefficient commitments, constant term first.
        commitments: Vec<CompressedPoint>,
        /// Proof of knowledge over the constant term.
        pok: SchnorrPok,
        /// Merkle membership proof for this validator's leaf.
        participant_proof: MerkleProof,
    },
    /// Publish this validator's verification share and encrypted peer shares.
    KeyGenPublishShares {
        /// Ceremony group.
        group_id: GroupId,
        /// This validator's public verification share.
        verification_share: CompressedPoint,
        /// Per-recipient encrypted polynomial evaluations.
        encrypted_shares: BTreeMap<ParticipantId, Vec<u8>>,
    },
    /// File a complaint against a participant that sent an invalid share.
    KeyGenComplain {
        /// Ceremony group.
        group_id: GroupId,
        /// The misbehaving participant.
        accused: ParticipantId,
    },
    /// Answer a complaint by revealing the disputed share in the clear.
    KeyGenComplaintResponse {
        /// Ceremony group.
        group_id: GroupId,
        /// The complaining participant.
        plaintiff: ParticipantId,
        /// The disputed share.
        plaintext_share: ScalarBytes,
    },
    /// Confirm the ceremony outcome.
    KeyGenConfirm {
        /// Ceremony group.
        group_id: GroupId,
        /// Optional routing context for the confirmation callback.
        callback: Option<CallbackContext>,
    },
    /// Pre-commit a fresh nonce tree for a group.
    RegisterNonceCommitments {
        /// The group the tree serves.
        group_id: GroupId,
        /// The tree's Merkle root.
        nonce_tree_root: B256,
    },
    /// Reveal this validator's one-time nonces for a signature request.
    RevealNonceCommitments {
        /// The request being served.
        signature_id: SignatureId,
        /// Hiding commitment `D`.
        hiding: CompressedPoint,
        /// Binding commitment `E`.
        binding: CompressedPoint,
        /// Merkle proof of the leaf inside the committed tree.
        proof: MerkleProof,
    },
    /// Ask the consensus contract to open a signature request.
    SignRequest {
        /// The group that should sign.
        group_id: GroupId,
        /// The digest to sign.
        message: MessageDigest,
    },
    /// Publish this validator's signature share.
    PublishSignatureShare {
        /// The request being served.
        signature_id: SignatureId,
        /// Merkle root over the signer set.
        signers_root: B256,
        /// Membership proof for this signer.
        signers_proof: MerkleProof,
        /// The group commitment `R`.
        group_commitment: CompressedPoint,
        /// This signer's bound commitment `Rᵢ`.
        commitment_share: CompressedPoint,
        /// The response scalar `zᵢ`.
        share: ScalarBytes,
        /// The Lagrange coefficient `λᵢ` used in the share.
        lagrange: ScalarBytes,
        /// Optional routing context for the completion callback.
        callback: Option<CallbackContext>,
    },
    /// Stage a signed epoch rollover on the consensus contract.
    StageEpoch {
        /// The epoch being staged.
        proposed_epoch: u64,
        /// First block of the staged epoch.
        rollover_block: u64,
        /// The incoming group.
        group_id: GroupId,
        /// The signature that authorises the rollover.
        signature_id: SignatureId,
    },
    /// Record a transaction attestation on the consensus contract.
    AttestTransaction {
        /// Epoch whose group attested.
        epoch: u64,
        /// The attested transaction hash.
        tx_hash: B256,
        /// The signature that authorises the attestation.
        signature_id: SignatureId,
    },
}

impl Action {
    /// The contract this action is submitted to.
    pub fn target(&self) -> Target {
        match self {
            Action::StageEpoch { .. } | Action::AttestTransaction { .. } => Target::Consensus,
            _ => Target::Coordinator,
        }
    }

    /// A stable name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Action::KeyGenStart { .. } => "KeyGenStart",
            Action::KeyGenPublishShares { .. } => "KeyGenPublishShares",
            Action::KeyGenComplain { .. } => "KeyGenComplain",
            Action::KeyGenComplaintResponse { .. } => "KeyGenComplaintResponse",
            Action::KeyGenConfirm { .. } => "KeyGenConfirm",
            Action::RegisterNonceCommitments { .. } => "RegisterNonceCommitments",
            Action::RevealNonceCommitments { .. } => "RevealNonceCommitments",
            Action::SignRequest { .. } => "SignRequest",
            Action::PublishSignatureShare { .. } => "PublishSignatureShare",
            Action::StageEpoch { .. } => "StageEpoch",
            Action::AttestTransaction { .. } => "AttestTransaction",
        }
    }
}

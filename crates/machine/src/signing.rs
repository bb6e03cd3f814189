// Path: crates/machine/src/signing.rs

//! The signing client.
//!
//! Drives a single signature: nonce-tree pre-commitment, nonce reveal with
//! Merkle proof, peer commitment collection, and share computation. Shares
//! are *returned* to the machine; the client never submits anything itself.

use alloy_primitives::B256;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sigil_api::storage::{
    GroupStore, NonceLeaf, NonceTreeRecord, NonceTreeStore, SigningSessionStore,
};
use sigil_crypto::{frost, merkle, noncetree, point};
use sigil_types::error::ProtocolError;
use sigil_types::group::Group;
use sigil_types::ids::{
    decode_sequence, CompressedPoint, GroupId, MerkleProof, MessageDigest, ParticipantId,
    ScalarBytes, SignatureId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::MachineError;

/// The public half of this validator's nonce reveal.
pub struct RevealData {
    /// Hiding commitment `D`.
    pub hiding: CompressedPoint,
    /// Binding commitment `E`.
    pub binding: CompressedPoint,
    /// Membership proof of the leaf inside the committed tree.
    pub proof: MerkleProof,
}

/// A computed signature share, ready for `PublishSignatureShare`.
pub struct ShareBundle {
    /// Merkle root over the signer set.
    pub signers_root: B256,
    /// Membership proof for this signer.
    pub signers_proof: MerkleProof,
    /// The group commitment `R`.
    pub group_commitment: CompressedPoint,
    /// This signer's bound commitment `Rᵢ`.
    pub commitment_share: CompressedPoint,
    /// The response scalar `zᵢ`.
    pub share: ScalarBytes,
    /// The Lagrange coefficient `λᵢ`.
    pub lagrange: ScalarBytes,
}

/// The signing client (one per validator).
pub struct SigningClient<S> {
    storage: Arc<S>,
    tree_size: u32,
    rng: Mutex<StdRng>,
}

impl<S> SigningClient<S>
where
    S: GroupStore + NonceTreeStore + SigningSessionStore,
{
    /// Builds a client drawing entropy from the OS.
    pub fn new(storage: Arc<S>, tree_size: u32) -> Self {
        SigningClient { storage, tree_size, rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Builds a client with a fixed seed (deterministic tests).
    pub fn with_seed(storage: Arc<S>, tree_size: u32, seed: [u8; 32]) -> Self {
        SigningClient { storage, tree_size, rng: Mutex::new(StdRng::from_seed(seed)) }
    }

    /// Creates and persists a fresh nonce tree, returning its root. The root
    /// is linked to a `(group, chunk)` pair once the chain acknowledges it.
    pub async fn create_nonce_tree(&self) -> Result<B256, MachineError> {
        let leaves = {
            let mut rng = self.rng.lock();
            noncetree::generate_leaves(&mut *rng, self.tree_size).map_err(ProtocolError::from)?
        };
        let root = noncetree::tree_root(&leaves);
        let record = NonceTreeRecord {
            root,
            leaves: leaves
                .iter()
                .map(|l| NonceLeaf {
                    hiding_nonce: Some(l.hiding_nonce),
                    hiding_commitment: l.hiding_commitment,
                    binding_nonce: Some(l.binding_nonce),
                    binding_commitment: l.binding_commitment,
                })
                .collect(),
        };
        self.storage.put_tree(&record).await?;
        debug!(target: "signing", root = %root, leaves = record.leaves.len(), "nonce tree created");
        Ok(root)
    }

    /// Binds a previously committed tree to `(group, chunk)`.
    pub async fn link_nonce_tree(
        &self,
        root: &B256,
        group_id: &GroupId,
        chunk: u32,
    ) -> Result<(), MachineError> {
        self.storage.link_tree(root, group_id, chunk).await?;
        Ok(())
    }

    /// Opens a signing session for a fresh request and, when this validator
    /// is among the signers, returns its nonce reveal.
    ///
    /// Requires `|signers| ≥ threshold` and `signers ⊆ group.participants`.
    pub async fn open_request(
        &self,
        group: &Group,
        signature_id: &SignatureId,
        sequence: u64,
        signers: &BTreeSet<ParticipantId>,
    ) -> Result<Option<RevealData>, MachineError> {
        if (signers.len() as u16) < group.threshold {
            return Err(ProtocolError::NotEnoughSigners {
                required: group.threshold,
                got: signers.len() as u16,
            }
            .into());
        }
        for signer in signers {
            if group.participant(*signer).is_none() {
                return Err(ProtocolError::UnknownSigner(*signer).into());
            }
        }

        self.storage.open_session(signature_id, signers, sequence).await?;

        if !group.self_id.is_some_and(|id| signers.contains(&id)) {
            return Ok(None);
        }

        let (chunk, offset) = decode_sequence(sequence);
        let tree = self
            .storage
            .tree(&group.id, chunk)
            .await?
            .ok_or(ProtocolError::NonceSlotBurned { chunk, offset })?;
        let leaf = tree
            .leaves
            .get(offset as usize)
            .ok_or(ProtocolError::NonceSlotBurned { chunk, offset })?;
        if leaf.hiding_nonce.is_none() {
            return Err(ProtocolError::NonceSlotBurned { chunk, offset }.into());
        }

        let commitments: Vec<(CompressedPoint, CompressedPoint)> = tree
            .leaves
            .iter()
            .map(|l| (l.hiding_commitment, l.binding_commitment))
            .collect();
        let proof = noncetree::prove_leaf(&commitments, offset).map_err(ProtocolError::from)?;

        Ok(Some(RevealData {
            hiding: leaf.hiding_commitment,
            binding: leaf.binding_commitment,
            proof,
        }))
    }

    /// Records one signer's revealed nonce commitments. Returns `true` when
    /// every signer of the session has contributed.
    pub async fn handle_nonce_commitments(
        &self,
        signature_id: &SignatureId,
        participant: ParticipantId,
        hiding: CompressedPoint,
        binding: CompressedPoint,
    ) -> Result<bool, MachineError> {
        let signers = self
            .storage
            .signers(signature_id)
            .await?
            .ok_or(ProtocolError::UnknownSigner(participant))?;
        if !signers.contains(&participant) {
            return Err(ProtocolError::UnknownSigner(participant).into());
        }

        self.storage.put_commitment(signature_id, participant, hiding, binding).await?;
        let commitments = self.storage.commitments(signature_id).await?;
        Ok(signers.iter().all(|s| commitments.contains_key(s)))
    }

    /// Signers of a session that have not revealed nonces yet.
    pub async fn missing_nonce_peers(
        &self,
        signature_id: &SignatureId,
    ) -> Result<BTreeSet<ParticipantId>, MachineError> {
        let signers = self.storage.signers(signature_id).await?.unwrap_or_default();
        let commitments = self.storage.commitments(signature_id).await?;
        Ok(signers
            .into_iter()
            .filter(|s| !commitments.contains_key(s))
            .collect())
    }

    /// Computes this validator's signature share for a complete session,
    /// burning the nonce slot exactly once.
    pub async fn create_share(
        &self,
        group: &Group,
        signature_id: &SignatureId,
        message: &MessageDigest,
    ) -> Result<ShareBundle, MachineError> {
        let self_id = group.self_id.ok_or(ProtocolError::UnknownSigner(0))?;
        let sequence = self
            .storage
            .sequence(signature_id)
            .await?
            .ok_or(ProtocolError::UnknownSigner(self_id))?;
        let (chunk, offset) = decode_sequence(sequence);

        let raw_commitments = self.storage.commitments(signature_id).await?;
        let mut commitments = BTreeMap::new();
        for (id, (hiding, binding)) in &raw_commitments {
            commitments.insert(
                *id,
                frost::SigningCommitment {
                    hiding: point::decode_point(hiding).map_err(ProtocolError::from)?,
                    binding: point::decode_point(binding).map_err(ProtocolError::from)?,
                },
            );
        }

        let leaf = self
            .storage
            .leaf(&group.id, chunk, offset)
            .await?
            .ok_or(ProtocolError::NonceSlotBurned { chunk, offset })?;
        let (Some(hiding_nonce), Some(binding_nonce)) = (leaf.hiding_nonce, leaf.binding_nonce)
        else {
            return Err(ProtocolError::NonceSlotBurned { chunk, offset }.into());
        };

        let group_public = group
            .public_key
            .as_ref()
            .ok_or(ProtocolError::UnknownGroup(group.id))?;
        let signing_share = group
            .signing_share
            .as_ref()
            .ok_or(ProtocolError::UnknownGroup(group.id))?;
        let verification_share = group
            .verification_share
            .as_ref()
            .ok_or(ProtocolError::UnknownGroup(group.id))?;

        let output = frost::create_share(&frost::ShareInput {
            group_public: &point::decode_point(group_public).map_err(ProtocolError::from)?,
            message: &message.0,
            commitments: &commitments,
            own_index: self_id,
            hiding_nonce: point::decode_scalar(&hiding_nonce).map_err(ProtocolError::from)?,
            binding_nonce: point::decode_scalar(&binding_nonce).map_err(ProtocolError::from)?,
            signing_share: &point::decode_scalar(signing_share).map_err(ProtocolError::from)?,
        })
        .map_err(ProtocolError::from)?;

        // Self-check before anything is published or burned.
        let own_verification =
            point::decode_point(verification_share).map_err(ProtocolError::from)?;
        if !frost::verify_share(
            &output.share,
            &output.commitment_share,
            &output.lagrange,
            &output.challenge,
            &own_verification,
        ) {
            return Err(ProtocolError::SelfCheckFailed.into());
        }

        if !self.storage.burn_leaf(&group.id, chunk, offset).await? {
            return Err(ProtocolError::NonceSlotBurned { chunk, offset }.into());
        }

        let signer_leaves: Vec<[u8; 32]> = raw_commitments
            .keys()
            .filter_map(|id| group.participant(*id))
            .map(merkle::participant_leaf)
            .collect();
        let signers_root = merkle::root(&signer_leaves);
        let self_position = raw_commitments
            .keys()
            .position(|id| *id == self_id)
            .unwrap_or_default() as u32;
        let signers_proof =
            merkle::prove(&signer_leaves, self_position).map_err(ProtocolError::from)?;

        debug!(
            target: "signing",
            signature = %signature_id,
            chunk,
            offset,
            "share created, nonce slot burned"
        );
        Ok(ShareBundle {
            signers_root,
            signers_proof,
            group_commitment: point::encode_point(&output.group_commitment),
            commitment_share: point::encode_point(&output.commitment_share),
            share: point::encode_scalar(&output.share),
            lagrange: point::encode_scalar(&output.lagrange),
        })
    }

    /// Unburned leaves remaining for a group across its linked trees.
    pub async fn remaining_capacity(&self, group_id: &GroupId) -> Result<u64, MachineError> {
        Ok(self.storage.remaining_leaves(group_id).await?)
    }

    /// Drops a session's bookkeeping.
    pub async fn close_session(&self, signature_id: &SignatureId) -> Result<(), MachineError> {
        self.storage.remove_session(signature_id).await?;
        Ok(())
    }
}

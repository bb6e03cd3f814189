// Path: crates/machine/src/keygen.rs

//! The key-gen client.
//!
//! Drives a single group through distributed key generation: commitments
//! with proofs of knowledge, encrypted share distribution, complaint
//! resolution, and confirmation. The client is stateless per call: ordering
//! is enforced by the machine's rollover sub-state and everything durable
//! goes through the ceremony store.

use alloy_primitives::Address;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sigil_api::storage::{GroupStore, KeygenCeremony, KeygenStore};
use sigil_crypto::{hash, merkle, point, sealed, vss};
use sigil_types::error::ProtocolError;
use sigil_types::group::{Group, GroupContext, Participant};
use sigil_types::ids::{
    CompressedPoint, GroupId, MerkleProof, ParticipantId, ScalarBytes, SchnorrPok,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::MachineError;

/// Everything `KeyGenStart` needs, produced by [`KeygenClient::setup`].
pub struct KeygenSetup {
    /// The freshly derived (unconfirmed) group.
    pub group: Group,
    /// This validator's id inside the group.
    pub self_id: ParticipantId,
    /// Coefficient commitments, constant term first.
    pub commitments: Vec<CompressedPoint>,
    /// Proof of knowledge over the constant term.
    pub pok: SchnorrPok,
    /// Membership proof for this validator's participant leaf.
    pub participant_proof: MerkleProof,
}

/// The payload of a `KeyGenPublishShares` action.
pub struct KeygenShares {
    /// This validator's public verification share.
    pub verification_share: CompressedPoint,
    /// Per-recipient encrypted polynomial evaluations.
    pub encrypted_shares: BTreeMap<ParticipantId, Vec<u8>>,
}

/// Outcome of ingesting one peer's share batch.
pub enum ShareOutcome {
    /// The share verified and was folded into the signing share.
    Accepted,
    /// The share failed verification; the machine should complain.
    Invalid,
    /// The batch did not concern this validator (not a member).
    NotAddressed,
}

/// Key material returned when a confirmed group is finalised.
pub struct FinalizedGroup {
    /// The aggregate public key, compressed.
    pub public_key: CompressedPoint,
    /// The aggregate public key's affine coordinates (for rollover packets).
    pub public_key_coordinates: ([u8; 32], [u8; 32]),
}

/// The key-gen client (one per validator).
pub struct KeygenClient<S> {
    storage: Arc<S>,
    self_address: Address,
    rng: Mutex<StdRng>,
}

impl<S> KeygenClient<S>
where
    S: GroupStore + KeygenStore,
{
    /// Builds a client drawing entropy from the OS.
    pub fn new(storage: Arc<S>, self_address: Address) -> Self {
        KeygenClient { storage, self_address, rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Builds a client with a fixed seed (deterministic tests).
    pub fn with_seed(storage: Arc<S>, self_address: Address, seed: [u8; 32]) -> Self {
        KeygenClient { storage, self_address, rng: Mutex::new(StdRng::from_seed(seed)) }
    }

    /// Derives the group, samples this validator's polynomial, persists both,
    /// and returns the `KeyGenStart` payload.
    ///
    /// `participants` must already be normalized (id-ascending, non-zero,
    /// duplicate-free).
    pub async fn setup(
        &self,
        participants: Vec<Participant>,
        threshold: u16,
        context: GroupContext,
    ) -> Result<KeygenSetup, MachineError> {
        let self_id = participants
            .iter()
            .find(|p| p.address == self.self_address)
            .map(|p| p.id)
            .ok_or(ProtocolError::UnknownSigner(0))?;

        let participants_root = merkle::participants_root(&participants);
        let count = participants.len() as u16;
        let group_id = hash::group_id(&participants_root, count, threshold, &context);

        let poly = {
            let mut rng = self.rng.lock();
            vss::generate_polynomial(&mut *rng, threshold)
        };
        let commitments: Vec<CompressedPoint> =
            poly.commitments.iter().map(point::encode_point).collect();

        let pok = {
            let context_digest = hash::context_digest(&context);
            let mut rng = self.rng.lock();
            vss::generate_pok(&mut *rng, &poly.coefficients[0], self_id, &context_digest)
        };

        let leaf_index = participants
            .iter()
            .position(|p| p.id == self_id)
            .unwrap_or_default() as u32;
        let leaves: Vec<[u8; 32]> = participants.iter().map(merkle::participant_leaf).collect();
        let participant_proof =
            merkle::prove(&leaves, leaf_index).map_err(ProtocolError::from)?;

        let group = Group {
            id: group_id,
            participants,
            participants_root,
            threshold,
            context,
            public_key: None,
            self_id: Some(self_id),
            signing_share: None,
            verification_share: None,
        };
        self.storage.put_group(&group).await?;

        let ceremony = KeygenCeremony {
            coefficients: poly.coefficients.iter().map(point::encode_scalar).collect(),
            ..Default::default()
        };
        self.storage.put_ceremony(&group_id, &ceremony).await?;

        debug!(target: "keygen", group = %group_id, self_id, count, threshold, "ceremony set up");
        Ok(KeygenSetup {
            group,
            self_id,
            commitments,
            pok,
            participant_proof,
        })
    }

    /// Verifies and records one participant's coefficient commitments.
    pub async fn handle_commitment(
        &self,
        group_id: &GroupId,
        participant: ParticipantId,
        commitments: &[CompressedPoint],
        pok: &SchnorrPok,
    ) -> Result<(), MachineError> {
        let group = self.require_group(group_id).await?;
        let mut ceremony = self.require_ceremony(group_id).await?;

        if group.participant(participant).is_none() {
            return Err(ProtocolError::UnknownSigner(participant).into());
        }
        if ceremony.commitments.contains_key(&participant) {
            // At-least-once delivery: an identical replay is benign.
            return Ok(());
        }
        if commitments.len() != group.threshold as usize {
            return Err(ProtocolError::InvalidProofOfKnowledge(participant).into());
        }

        let context_digest = hash::context_digest(&group.context);
        let constant = commitments
            .first()
            .ok_or(ProtocolError::InvalidProofOfKnowledge(participant))?;
        let valid = vss::verify_pok(pok, constant, participant, &context_digest)
            .map_err(ProtocolError::from)?;
        if !valid {
            return Err(ProtocolError::InvalidProofOfKnowledge(participant).into());
        }

        ceremony.commitments.insert(participant, commitments.to_vec());
        self.storage.put_ceremony(group_id, &ceremony).await?;
        Ok(())
    }

    /// Computes this validator's verification share and the encrypted share
    /// for every peer. Requires the commitment phase to be complete.
    pub async fn publish_shares(&self, group_id: &GroupId) -> Result<KeygenShares, MachineError> {
        let group = self.require_group(group_id).await?;
        let ceremony = self.require_ceremony(group_id).await?;
        let self_id = group.self_id.ok_or(ProtocolError::UnknownSigner(0))?;

        let coefficients = decode_coefficients(&ceremony.coefficients)?;
        let poly = vss::SecretPolynomial {
            commitments: coefficients.iter().map(|c| point::generator() * c).collect(),
            coefficients,
        };

        let mut encrypted_shares = BTreeMap::new();
        for peer in &group.participants {
            if peer.id == self_id {
                continue;
            }
            let peer_commitments = ceremony
                .commitments
                .get(&peer.id)
                .ok_or(ProtocolError::UnknownSigner(peer.id))?;
            let peer_c0 = peer_commitments
                .first()
                .ok_or(ProtocolError::UnknownSigner(peer.id))?;
            let peer_c0 = point::decode_point(peer_c0).map_err(ProtocolError::from)?;

            let share = vss::share_for(&poly, peer.id);
            let sealed = sealed::seal_share(
                group_id,
                &poly.coefficients[0],
                &peer_c0,
                self_id,
                peer.id,
                point::encode_scalar(&share).as_slice(),
            )
            .map_err(ProtocolError::from)?;
            encrypted_shares.insert(peer.id, sealed);
        }

        let verification_share =
            vss::derive_verification_share(ceremony.commitments.values(), self_id)
                .map_err(ProtocolError::from)?;

        Ok(KeygenShares {
            verification_share: point::encode_point(&verification_share),
            encrypted_shares,
        })
    }

    /// Ingests one participant's published share batch: decrypts our slot,
    /// runs the VSS check, and folds the share into the signing-share
    /// accumulator. Our own batch is accounted directly from the polynomial.
    pub async fn handle_shares(
        &self,
        group_id: &GroupId,
        sharer: ParticipantId,
        encrypted_shares: &BTreeMap<ParticipantId, Vec<u8>>,
    ) -> Result<ShareOutcome, MachineError> {
        let group = self.require_group(group_id).await?;
        let mut ceremony = self.require_ceremony(group_id).await?;
        let Some(self_id) = group.self_id else {
            return Ok(ShareOutcome::NotAddressed);
        };

        if ceremony.shares_received.contains(&sharer) {
            return Ok(ShareOutcome::Accepted);
        }
        let Some(sharer_commitments) = ceremony.commitments.get(&sharer).cloned() else {
            return Err(ProtocolError::UnknownSigner(sharer).into());
        };

        let coefficients = decode_coefficients(&ceremony.coefficients)?;
        let share = if sharer == self_id {
            let poly = vss::SecretPolynomial {
                commitments: Vec::new(),
                coefficients: coefficients.clone(),
            };
            vss::share_for(&poly, self_id)
        } else {
            let Some(ciphertext) = encrypted_shares.get(&self_id) else {
                warn!(target: "keygen", group = %group_id, sharer, "share batch missing our slot");
                return Ok(ShareOutcome::Invalid);
            };
            let sharer_c0 = sharer_commitments
                .first()
                .ok_or(ProtocolError::UnknownSigner(sharer))?;
            let sharer_c0 = point::decode_point(sharer_c0).map_err(ProtocolError::from)?;

            let opened = match sealed::open_share(
                group_id,
                &coefficients[0],
                &sharer_c0,
                sharer,
                self_id,
                ciphertext,
            ) {
                Ok(plain) => plain,
                Err(_) => {
                    warn!(target: "keygen", group = %group_id, sharer, "share decryption failed");
                    return Ok(ShareOutcome::Invalid);
                }
            };
            let Ok(bytes) = <[u8; 32]>::try_from(opened.as_slice()) else {
                return Ok(ShareOutcome::Invalid);
            };
            match point::decode_scalar(&ScalarBytes::from(bytes)) {
                Ok(scalar) => scalar,
                Err(_) => return Ok(ShareOutcome::Invalid),
            }
        };

        let valid =
            vss::verify_share(&share, &sharer_commitments, self_id).map_err(ProtocolError::from)?;
        if !valid {
            warn!(target: "keygen", group = %group_id, sharer, "share failed VSS check");
            return Ok(ShareOutcome::Invalid);
        }

        let acc = point::decode_scalar(&ceremony.signing_share_acc)
            .map_err(ProtocolError::from)?;
        ceremony.signing_share_acc = point::encode_scalar(&(acc + share));
        ceremony.shares_received.insert(sharer);
        self.storage.put_ceremony(group_id, &ceremony).await?;
        Ok(ShareOutcome::Accepted)
    }

    /// The plaintext share we owe `plaintiff`, published when we are accused.
    pub async fn respond_to_complaint(
        &self,
        group_id: &GroupId,
        plaintiff: ParticipantId,
    ) -> Result<ScalarBytes, MachineError> {
        let ceremony = self.require_ceremony(group_id).await?;
        let coefficients = decode_coefficients(&ceremony.coefficients)?;
        let poly = vss::SecretPolynomial { commitments: Vec::new(), coefficients };
        Ok(point::encode_scalar(&vss::share_for(&poly, plaintiff)))
    }

    /// Checks a revealed plaintext share against the accused's committed
    /// polynomial. Returns `true` when the share is good (the complaint was
    /// unfounded).
    pub async fn handle_complaint_response(
        &self,
        group_id: &GroupId,
        accused: ParticipantId,
        plaintiff: ParticipantId,
        plaintext_share: &ScalarBytes,
    ) -> Result<bool, MachineError> {
        let ceremony = self.require_ceremony(group_id).await?;
        let Some(commitments) = ceremony.commitments.get(&accused) else {
            return Ok(false);
        };
        let Ok(share) = point::decode_scalar(plaintext_share) else {
            return Ok(false);
        };
        let valid =
            vss::verify_share(&share, commitments, plaintiff).map_err(ProtocolError::from)?;
        Ok(valid)
    }

    /// Marks a participant compromised after a proven-bad share.
    pub async fn mark_compromised(
        &self,
        group_id: &GroupId,
        participant: ParticipantId,
    ) -> Result<(), MachineError> {
        let mut ceremony = self.require_ceremony(group_id).await?;
        ceremony.compromised.insert(participant);
        self.storage.put_ceremony(group_id, &ceremony).await?;
        Ok(())
    }

    /// Finalises a fully confirmed group: computes the aggregate key and this
    /// validator's shares, updates the group record, and drops the ceremony.
    pub async fn finalize(&self, group_id: &GroupId) -> Result<FinalizedGroup, MachineError> {
        let mut group = self.require_group(group_id).await?;
        let ceremony = self.require_ceremony(group_id).await?;
        let self_id = group.self_id.ok_or(ProtocolError::UnknownSigner(0))?;

        let public_key = vss::aggregate_public_key(
            ceremony
                .commitments
                .values()
                .filter_map(|c| c.first())
                .copied(),
        )
        .map_err(ProtocolError::from)?;

        let verification_share =
            vss::derive_verification_share(ceremony.commitments.values(), self_id)
                .map_err(ProtocolError::from)?;

        let coordinates =
            point::affine_coordinates(&public_key).map_err(ProtocolError::from)?;
        let encoded_key = point::encode_point(&public_key);

        group.public_key = Some(encoded_key);
        group.signing_share = Some(ceremony.signing_share_acc);
        group.verification_share = Some(point::encode_point(&verification_share));
        self.storage.put_group(&group).await?;
        self.storage.remove_ceremony(group_id).await?;

        debug!(target: "keygen", group = %group_id, "group confirmed and finalised");
        Ok(FinalizedGroup { public_key: encoded_key, public_key_coordinates: coordinates })
    }

    /// Aborts an unconfirmed ceremony and drops its group record.
    pub async fn abort(&self, group_id: &GroupId) -> Result<(), MachineError> {
        self.storage.remove_ceremony(group_id).await?;
        self.storage.retire_group(group_id).await?;
        warn!(target: "keygen", group = %group_id, "ceremony aborted");
        Ok(())
    }

    /// Participants that have committed so far.
    pub async fn committed_participants(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<ParticipantId>, MachineError> {
        let ceremony = self.require_ceremony(group_id).await?;
        Ok(ceremony.commitments.keys().copied().collect())
    }

    async fn require_group(&self, group_id: &GroupId) -> Result<Group, MachineError> {
        self.storage
            .group(group_id)
            .await?
            .ok_or_else(|| ProtocolError::UnknownGroup(*group_id).into())
    }

    async fn require_ceremony(&self, group_id: &GroupId) -> Result<KeygenCeremony, MachineError> {
        self.storage
            .ceremony(group_id)
            .await?
            .ok_or_else(|| ProtocolError::UnknownGroup(*group_id).into())
    }
}

fn decode_coefficients(
    coefficients: &[ScalarBytes],
) -> Result<Vec<point::Scalar>, ProtocolError> {
    coefficients
        .iter()
        .map(|c| point::decode_scalar(c).map_err(ProtocolError::from))
        .collect()
}

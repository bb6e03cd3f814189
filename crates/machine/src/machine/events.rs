// Path: crates/machine/src/machine/events.rs

//! Event dispatch for the protocol state machine.
//!
//! Semantic failures on untrusted chain input (bad proofs, unknown groups,
//! unverified digests) drop the event with a warning; only storage faults
//! propagate. Protocol violations this validator can prove about a peer are
//! answered with a complaint.

use sigil_api::storage::{GroupStore, SigningSessionStore, ValidatorStorage};
use sigil_types::action::{Action, CallbackContext};
use sigil_types::error::ProtocolError;
use sigil_types::event::ChainEvent;
use sigil_types::group::GroupContext;
use sigil_types::ids::{
    CompressedPoint, GroupId, MessageDigest, ParticipantId, ScalarBytes, SchnorrPok, SignatureId,
};
use sigil_types::packet::{
    AccountTransaction, AccountTransactionPacket, EpochRolloverPacket, Packet, PacketDomain,
};
use sigil_types::state::{RolloverState, SigningPhase, SigningState};
use alloy_primitives::B256;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::{Ctx, Machine};
use crate::error::MachineError;
use crate::keygen::ShareOutcome;

impl<S> Machine<S>
where
    S: ValidatorStorage + 'static,
{
    pub(crate) async fn dispatch_event(
        &self,
        ctx: &mut Ctx,
        block: u64,
        event: &ChainEvent,
    ) -> Result<(), MachineError> {
        match event.clone() {
            ChainEvent::KeyGen { group_id, participants_root, count, threshold, context } => {
                self.on_key_gen(ctx, block, group_id, participants_root, count, threshold, context)
                    .await
            }
            ChainEvent::KeyGenCommitted { group_id, participant, commitments, pok, committed } => {
                self.on_key_gen_committed(ctx, block, group_id, participant, commitments, pok, committed)
                    .await
            }
            ChainEvent::KeyGenSecretShared {
                group_id, participant, encrypted_shares, shared, ..
            } => {
                self.on_key_gen_secret_shared(ctx, block, group_id, participant, encrypted_shares, shared)
                    .await
            }
            ChainEvent::KeyGenComplained { group_id, plaintiff, accused } => {
                self.on_key_gen_complained(ctx, group_id, plaintiff, accused).await
            }
            ChainEvent::KeyGenComplaintResponded {
                group_id, accused, plaintiff, plaintext_share,
            } => {
                self.on_key_gen_complaint_responded(ctx, group_id, accused, plaintiff, plaintext_share)
                    .await
            }
            ChainEvent::KeyGenConfirmed { group_id, participant, confirmed } => {
                self.on_key_gen_confirmed(ctx, block, group_id, participant, confirmed).await
            }
            ChainEvent::Preprocess { group_id, participant, chunk, commitment } => {
                self.on_preprocess(ctx, group_id, participant, chunk, commitment).await
            }
            ChainEvent::Sign { initiator, group_id, message, signature_id, sequence } => {
                self.on_sign(ctx, block, initiator, group_id, message, signature_id, sequence)
                    .await
            }
            ChainEvent::SignRevealedNonces { signature_id, participant, hiding, binding } => {
                self.on_sign_revealed_nonces(ctx, block, signature_id, participant, hiding, binding)
                    .await
            }
            ChainEvent::SignShared { signature_id, participant, .. } => {
                self.on_sign_shared(ctx, signature_id, participant)
            }
            ChainEvent::SignCompleted { signature_id, .. } => {
                self.on_sign_completed(ctx, block, signature_id).await
            }
            ChainEvent::EpochProposed { .. } => Ok(()),
            ChainEvent::EpochStaged { proposed_epoch, .. } => {
                self.on_epoch_staged(ctx, proposed_epoch).await
            }
            ChainEvent::TransactionProposed { message, tx_hash, epoch, tx } => {
                self.on_transaction_proposed(ctx, block, message, tx_hash, epoch, tx).await
            }
            ChainEvent::TransactionAttested { message } => {
                self.on_transaction_attested(ctx, message).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_key_gen(
        &self,
        ctx: &mut Ctx,
        block: u64,
        group_id: GroupId,
        participants_root: B256,
        count: u16,
        threshold: u16,
        context: GroupContext,
    ) -> Result<(), MachineError> {
        if context.consensus != self.config.consensus_address {
            return Ok(());
        }
        if context.epoch != ctx.consensus.active_epoch + 1 {
            debug!(target: "machine", group = %group_id, epoch = context.epoch, "ignoring key-gen for non-next epoch");
            return Ok(());
        }
        // Our own opening echoes back; the phase is already tracked.
        if let RolloverState::CollectingCommitments { group_id: current, .. } = &ctx.rollover {
            if *current == group_id {
                return Ok(());
            }
        }

        // Another validator opened the ceremony. Join it if it commits to
        // the default participant set (or the set serving the active epoch).
        let defaults = self.default_participants();
        let mut participants = None;
        if sigil_crypto::merkle::participants_root(&defaults) == participants_root {
            participants = Some(defaults);
        } else if let Some(active) = self.group_for_epoch(ctx, ctx.consensus.active_epoch).await? {
            if active.participants_root == participants_root {
                participants = Some(active.participants);
            }
        }
        let Some(participants) = participants else {
            warn!(target: "machine", group = %group_id, "ignoring key-gen with unknown participant set");
            return Ok(());
        };
        if participants.len() as u16 != count
            || !participants.iter().any(|p| p.address == self.config.self_address)
        {
            return Ok(());
        }

        if self.storage.group(&group_id).await?.is_none() {
            // We did not open this ceremony ourselves: set up and commit.
            self.start_keygen(ctx, block, context.epoch, participants, threshold).await?;
        } else {
            ctx.rollover = RolloverState::CollectingCommitments {
                group_id,
                next_epoch: context.epoch,
                deadline: block + self.config.key_gen_timeout_blocks,
            };
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_key_gen_committed(
        &self,
        ctx: &mut Ctx,
        block: u64,
        group_id: GroupId,
        participant: ParticipantId,
        commitments: Vec<CompressedPoint>,
        pok: SchnorrPok,
        committed: bool,
    ) -> Result<(), MachineError> {
        let RolloverState::CollectingCommitments { group_id: current, next_epoch, .. } =
            ctx.rollover
        else {
            return Ok(());
        };
        if current != group_id {
            return Ok(());
        }

        if let Err(violation) =
            soften(self.keygen.handle_commitment(&group_id, participant, &commitments, &pok).await)?
        {
            warn!(target: "machine", group = %group_id, participant, %violation, "dropping invalid commitment");
            return Ok(());
        }

        if !committed {
            // Progress refreshes the inactivity deadline.
            ctx.rollover = RolloverState::CollectingCommitments {
                group_id,
                next_epoch,
                deadline: block + self.config.key_gen_timeout_blocks,
            };
            return Ok(());
        }
        {
            let Some(group) = self.storage.group(&group_id).await? else {
                return Err(ProtocolError::UnknownGroup(group_id).into());
            };
            let shares = self.keygen.publish_shares(&group_id).await?;
            ctx.actions.push(Action::KeyGenPublishShares {
                group_id,
                verification_share: shares.verification_share,
                encrypted_shares: shares.encrypted_shares,
            });
            ctx.rollover = RolloverState::CollectingShares {
                group_id,
                next_epoch,
                deadline: block + self.config.key_gen_timeout_blocks,
                complaints: BTreeSet::new(),
                missing_shares_from: group.participant_ids().collect(),
                last_participant: Some(participant),
            };
        }
        Ok(())
    }

    async fn on_key_gen_secret_shared(
        &self,
        ctx: &mut Ctx,
        block: u64,
        group_id: GroupId,
        participant: ParticipantId,
        encrypted_shares: BTreeMap<ParticipantId, Vec<u8>>,
        shared: bool,
    ) -> Result<(), MachineError> {
        let RolloverState::CollectingShares {
            group_id: current,
            next_epoch,
            ref mut deadline,
            ref mut complaints,
            ref mut missing_shares_from,
            ..
        } = ctx.rollover
        else {
            return Ok(());
        };
        if current != group_id {
            return Ok(());
        }

        match soften(self.keygen.handle_shares(&group_id, participant, &encrypted_shares).await)? {
            Ok(ShareOutcome::Invalid) => {
                ctx.actions.push(Action::KeyGenComplain { group_id, accused: participant });
                complaints.insert(participant);
            }
            Ok(ShareOutcome::Accepted) | Ok(ShareOutcome::NotAddressed) => {}
            Err(violation) => {
                warn!(target: "machine", group = %group_id, participant, %violation, "dropping invalid share batch");
                return Ok(());
            }
        }
        missing_shares_from.remove(&participant);
        *deadline = block + self.config.key_gen_timeout_blocks;

        if shared {
            let complaints = complaints.clone();
            let missing_shares_from = missing_shares_from.clone();
            let timeout = self.config.key_gen_timeout_blocks;
            ctx.actions.push(Action::KeyGenConfirm { group_id, callback: None });
            ctx.rollover = RolloverState::CollectingConfirmations {
                group_id,
                next_epoch,
                complaints,
                complaint_deadline: block + timeout,
                response_deadline: block + 2 * timeout,
                deadline: block + 2 * timeout,
                last_participant: Some(participant),
                missing_shares_from,
                confirmations_from: BTreeSet::new(),
            };
        }
        Ok(())
    }

    async fn on_key_gen_complained(
        &self,
        ctx: &mut Ctx,
        group_id: GroupId,
        plaintiff: ParticipantId,
        accused: ParticipantId,
    ) -> Result<(), MachineError> {
        let (current, complaints) = match &mut ctx.rollover {
            RolloverState::CollectingShares { group_id, complaints, .. }
            | RolloverState::CollectingConfirmations { group_id, complaints, .. } => {
                (*group_id, complaints)
            }
            _ => return Ok(()),
        };
        if current != group_id {
            return Ok(());
        }
        complaints.insert(accused);

        let Some(group) = self.storage.group(&group_id).await? else {
            return Ok(());
        };
        if group.self_id == Some(accused) {
            let plaintext_share = self.keygen.respond_to_complaint(&group_id, plaintiff).await?;
            ctx.actions.push(Action::KeyGenComplaintResponse {
                group_id,
                plaintiff,
                plaintext_share,
            });
        }
        Ok(())
    }

    async fn on_key_gen_complaint_responded(
        &self,
        ctx: &mut Ctx,
        group_id: GroupId,
        accused: ParticipantId,
        plaintiff: ParticipantId,
        plaintext_share: ScalarBytes,
    ) -> Result<(), MachineError> {
        let (current, next_epoch) = match &ctx.rollover {
            RolloverState::CollectingShares { group_id, next_epoch, .. }
            | RolloverState::CollectingConfirmations { group_id, next_epoch, .. } => {
                (*group_id, *next_epoch)
            }
            _ => return Ok(()),
        };
        if current != group_id {
            return Ok(());
        }

        let share_good = self
            .keygen
            .handle_complaint_response(&group_id, accused, plaintiff, &plaintext_share)
            .await?;
        if share_good {
            match &mut ctx.rollover {
                RolloverState::CollectingShares { complaints, .. }
                | RolloverState::CollectingConfirmations { complaints, .. } => {
                    complaints.remove(&accused);
                }
                _ => {}
            }
            return Ok(());
        }

        warn!(target: "machine", group = %group_id, accused, "bad share proven; aborting group");
        self.keygen.mark_compromised(&group_id, accused).await?;
        self.keygen.abort(&group_id).await?;
        ctx.rollover = RolloverState::EpochSkipped { next_epoch };
        Ok(())
    }

    async fn on_key_gen_confirmed(
        &self,
        ctx: &mut Ctx,
        block: u64,
        group_id: GroupId,
        participant: ParticipantId,
        confirmed: bool,
    ) -> Result<(), MachineError> {
        let RolloverState::CollectingConfirmations {
            group_id: current,
            next_epoch,
            ref mut confirmations_from,
            ..
        } = ctx.rollover
        else {
            return Ok(());
        };
        if current != group_id {
            return Ok(());
        }
        confirmations_from.insert(participant);
        if !confirmed {
            return Ok(());
        }

        let finalized = self.keygen.finalize(&group_id).await?;
        let Some(group) = self.storage.group(&group_id).await? else {
            return Err(ProtocolError::UnknownGroup(group_id).into());
        };
        let self_id = group.self_id.ok_or(ProtocolError::UnknownGroup(group_id))?;
        ctx.consensus
            .epoch_groups
            .insert(next_epoch, sigil_types::state::EpochGroup { group_id, participant_id: self_id });

        // A confirmed group needs signing nonces before any request can be
        // served; provision the first tree immediately.
        let tree_root = self.signing.create_nonce_tree().await?;
        ctx.actions.push(Action::RegisterNonceCommitments {
            group_id,
            nonce_tree_root: tree_root,
        });
        ctx.consensus.group_pending_nonces.insert(group_id);

        if ctx.consensus.genesis_group_id.is_none() {
            // The genesis group has nothing to hand over from; it becomes
            // authoritative immediately.
            info!(target: "machine", group = %group_id, "genesis group confirmed");
            ctx.consensus.genesis_group_id = Some(group_id);
            ctx.consensus.active_epoch = next_epoch;
            ctx.rollover = RolloverState::WaitingForRollover;
            return Ok(());
        }

        let (x, y) = finalized.public_key_coordinates;
        let packet = EpochRolloverPacket {
            domain: PacketDomain {
                chain_id: self.config.chain_id,
                consensus: self.config.consensus_address,
            },
            active_epoch: ctx.consensus.active_epoch,
            proposed_epoch: next_epoch,
            rollover_block: next_epoch * self.config.blocks_per_epoch,
            group_key_x: B256::from(x),
            group_key_y: B256::from(y),
        };
        let message = self
            .verifier
            .verify(&Packet::EpochRollover(packet.clone()), ctx.consensus.active_epoch)
            .await?;

        let Some(active_group) = self.group_for_epoch(ctx, ctx.consensus.active_epoch).await?
        else {
            return Err(ProtocolError::UnknownGroup(group_id).into());
        };
        // Responsibility carries over by address: the participant whose
        // confirmation completed the ceremony requests the signature.
        let responsible_address = group.participant(participant).map(|p| p.address);
        let responsible = responsible_address
            .and_then(|addr| active_group.participants.iter().find(|p| p.address == addr))
            .map(|p| p.id);

        ctx.rollover = RolloverState::SignRollover { group_id, next_epoch, message };
        ctx.signing.insert(
            message,
            SigningState {
                packet: Packet::EpochRollover(packet),
                phase: SigningPhase::WaitingForRequest {
                    responsible,
                    signers: active_group.participant_ids().collect(),
                    deadline: block + self.config.signing_timeout_blocks,
                },
            },
        );
        if responsible.is_some() && responsible == self.self_id_in(&active_group) {
            ctx.actions.push(Action::SignRequest { group_id: active_group.id, message });
        }
        Ok(())
    }

    async fn on_preprocess(
        &self,
        ctx: &mut Ctx,
        group_id: GroupId,
        participant: ParticipantId,
        chunk: u32,
        commitment: B256,
    ) -> Result<(), MachineError> {
        let Some(group) = self.storage.group(&group_id).await? else {
            return Ok(());
        };
        if group.self_id != Some(participant) {
            return Ok(());
        }
        match self.signing.link_nonce_tree(&commitment, &group_id, chunk).await {
            Ok(()) => {
                ctx.consensus.group_pending_nonces.remove(&group_id);
                debug!(target: "machine", group = %group_id, chunk, "nonce tree linked");
            }
            Err(MachineError::Storage(sigil_api::StorageError::NotFound)) => {
                // A stale acknowledgement for a tree this validator no
                // longer holds; nothing to link.
                warn!(target: "machine", group = %group_id, chunk, "ignoring unknown nonce tree root");
            }
            Err(other) => return Err(other),
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_sign(
        &self,
        ctx: &mut Ctx,
        block: u64,
        initiator: alloy_primitives::Address,
        group_id: GroupId,
        message: MessageDigest,
        signature_id: SignatureId,
        sequence: u64,
    ) -> Result<(), MachineError> {
        if initiator != self.config.consensus_address {
            warn!(target: "machine", %message, "ignoring sign request from foreign initiator");
            return Ok(());
        }
        if !self.verifier.is_verified(&message).await.map_err(MachineError::Verify)? {
            warn!(target: "machine", %message, "ignoring sign request for unverified digest");
            return Ok(());
        }
        let Some(entry) = ctx.signing.get(&message) else {
            return Ok(());
        };
        let SigningPhase::WaitingForRequest { signers, .. } = &entry.phase else {
            return Ok(());
        };
        let signers = signers.clone();

        let epoch = Self::packet_epoch(&entry.packet);
        let Some(serving) = ctx.consensus.group_for_epoch(epoch) else {
            return Ok(());
        };
        if serving.group_id != group_id {
            warn!(target: "machine", %message, "sign request names the wrong group");
            return Ok(());
        }
        let Some(group) = self.storage.group(&group_id).await? else {
            return Ok(());
        };

        // The session runs with exactly `threshold` signers; the entry's
        // full candidate set only shrinks through timeouts.
        let session_signers: BTreeSet<ParticipantId> =
            signers.iter().copied().take(group.threshold as usize).collect();

        let reveal =
            match soften(self.signing.open_request(&group, &signature_id, sequence, &session_signers).await)? {
                Ok(reveal) => reveal,
                Err(violation) => {
                    warn!(target: "machine", %message, %violation, "dropping sign request");
                    return Ok(());
                }
            };

        if let Some(entry) = ctx.signing.get_mut(&message) {
            entry.phase = SigningPhase::CollectNonceCommitments {
                signature_id,
                last_signer: None,
                deadline: block + self.config.signing_timeout_blocks,
            };
        }
        ctx.consensus.signature_to_message.insert(signature_id, message);

        if let Some(reveal) = reveal {
            ctx.actions.push(Action::RevealNonceCommitments {
                signature_id,
                hiding: reveal.hiding,
                binding: reveal.binding,
                proof: reveal.proof,
            });
        }

        // Replenish the nonce stock when this request dips it under the
        // low-water mark.
        if group.self_id.is_some()
            && !ctx.consensus.group_pending_nonces.contains(&group_id)
        {
            let remaining = self.signing.remaining_capacity(&group_id).await?;
            if remaining < u64::from(self.config.nonce_low_water_mark) {
                let root = self.signing.create_nonce_tree().await?;
                ctx.actions.push(Action::RegisterNonceCommitments {
                    group_id,
                    nonce_tree_root: root,
                });
                ctx.consensus.group_pending_nonces.insert(group_id);
            }
        }
        Ok(())
    }

    async fn on_sign_revealed_nonces(
        &self,
        ctx: &mut Ctx,
        block: u64,
        signature_id: SignatureId,
        participant: ParticipantId,
        hiding: CompressedPoint,
        binding: CompressedPoint,
    ) -> Result<(), MachineError> {
        let Some(message) = ctx.consensus.signature_to_message.get(&signature_id).copied() else {
            return Ok(());
        };
        let Some(entry) = ctx.signing.get(&message) else {
            return Ok(());
        };
        if !matches!(
            entry.phase,
            SigningPhase::CollectNonceCommitments { signature_id: sid, .. } if sid == signature_id
        ) {
            return Ok(());
        }

        let complete = match soften(
            self.signing.handle_nonce_commitments(&signature_id, participant, hiding, binding).await,
        )? {
            Ok(complete) => complete,
            Err(violation) => {
                warn!(target: "machine", %signature_id, participant, %violation, "dropping nonce reveal");
                return Ok(());
            }
        };
        if !complete {
            return Ok(());
        }

        let packet = entry.packet.clone();
        let epoch = Self::packet_epoch(&packet);
        let Some(group) = self.group_for_epoch(ctx, epoch).await? else {
            return Ok(());
        };

        if let Some(entry) = ctx.signing.get_mut(&message) {
            entry.phase = SigningPhase::CollectSigningShares {
                signature_id,
                shares_from: BTreeSet::new(),
                last_signer: None,
                deadline: block + self.config.signing_timeout_blocks,
            };
        }

        // Only signers hold a leaf for this request.
        let is_signer = match self.self_id_in(&group) {
            Some(id) => self
                .storage
                .signers(&signature_id)
                .await?
                .is_some_and(|signers| signers.contains(&id)),
            None => false,
        };
        if !is_signer {
            return Ok(());
        }

        let bundle = self.signing.create_share(&group, &signature_id, &message).await?;
        let callback = self.callback_for(ctx, &message, &packet);
        ctx.actions.push(Action::PublishSignatureShare {
            signature_id,
            signers_root: bundle.signers_root,
            signers_proof: bundle.signers_proof,
            group_commitment: bundle.group_commitment,
            commitment_share: bundle.commitment_share,
            share: bundle.share,
            lagrange: bundle.lagrange,
            callback,
        });
        Ok(())
    }

    /// The completion callback a signature share carries: stage-epoch when
    /// the digest is the current rollover's message, attest-transaction for
    /// a tracked transaction, nothing otherwise.
    fn callback_for(
        &self,
        ctx: &Ctx,
        message: &MessageDigest,
        packet: &Packet,
    ) -> Option<CallbackContext> {
        if let RolloverState::SignRollover { group_id, message: rollover_message, .. } =
            &ctx.rollover
        {
            if rollover_message == message {
                if let Packet::EpochRollover(p) = packet {
                    return Some(CallbackContext::StageEpoch {
                        proposed_epoch: p.proposed_epoch,
                        rollover_block: p.rollover_block,
                        group_id: *group_id,
                    });
                }
            }
        }
        if let Packet::AccountTransaction(p) = packet {
            return Some(CallbackContext::AttestTransaction {
                epoch: p.epoch,
                tx_hash: p.tx_hash,
            });
        }
        None
    }

    fn on_sign_shared(
        &self,
        ctx: &mut Ctx,
        signature_id: SignatureId,
        participant: ParticipantId,
    ) -> Result<(), MachineError> {
        let Some(message) = ctx.consensus.signature_to_message.get(&signature_id).copied() else {
            return Ok(());
        };
        let Some(entry) = ctx.signing.get_mut(&message) else {
            return Ok(());
        };
        if let SigningPhase::CollectSigningShares { signature_id: sid, shares_from, last_signer, .. } =
            &mut entry.phase
        {
            if *sid == signature_id {
                shares_from.insert(participant);
                *last_signer = Some(participant);
            }
        }
        Ok(())
    }

    async fn on_sign_completed(
        &self,
        ctx: &mut Ctx,
        block: u64,
        signature_id: SignatureId,
    ) -> Result<(), MachineError> {
        let Some(message) = ctx.consensus.signature_to_message.get(&signature_id).copied() else {
            return Ok(());
        };
        let Some(entry) = ctx.signing.get(&message) else {
            return Ok(());
        };
        let last_signer = match &entry.phase {
            SigningPhase::CollectSigningShares { last_signer, .. } => *last_signer,
            _ => None,
        };
        let packet = entry.packet.clone();

        let epoch = Self::packet_epoch(&packet);
        let acting = match self.group_for_epoch(ctx, epoch).await? {
            Some(group) => last_signer.is_some() && last_signer == self.self_id_in(&group),
            None => false,
        };

        match &packet {
            Packet::EpochRollover(p) => {
                if let RolloverState::SignRollover {
                    group_id, next_epoch, message: rollover_message,
                } = ctx.rollover
                {
                    if rollover_message == message {
                        ctx.rollover = RolloverState::EpochStaged { next_epoch };
                        if acting {
                            ctx.actions.push(Action::StageEpoch {
                                proposed_epoch: p.proposed_epoch,
                                rollover_block: p.rollover_block,
                                group_id,
                                signature_id,
                            });
                        }
                    }
                }
            }
            Packet::AccountTransaction(p) => {
                if acting {
                    ctx.actions.push(Action::AttestTransaction {
                        epoch: p.epoch,
                        tx_hash: p.tx_hash,
                        signature_id,
                    });
                }
            }
        }

        if let Some(entry) = ctx.signing.get_mut(&message) {
            entry.phase = SigningPhase::WaitingForAttestation {
                signature_id,
                responsible: last_signer,
                deadline: block + self.config.signing_timeout_blocks,
            };
        }
        self.signing.close_session(&signature_id).await?;
        Ok(())
    }

    async fn on_epoch_staged(
        &self,
        ctx: &mut Ctx,
        proposed_epoch: u64,
    ) -> Result<(), MachineError> {
        info!(target: "machine", active_epoch = proposed_epoch, "epoch staged");
        ctx.consensus.active_epoch = proposed_epoch;
        ctx.rollover = RolloverState::WaitingForRollover;

        // Drop the rollover's signing entry; its terminal callback landed.
        let staged: Vec<MessageDigest> = ctx
            .signing
            .iter()
            .filter(|(_, entry)| {
                matches!(&entry.packet, Packet::EpochRollover(p) if p.proposed_epoch == proposed_epoch)
            })
            .map(|(digest, _)| *digest)
            .collect();
        for digest in staged {
            ctx.signing.remove(&digest);
            ctx.consensus.signature_to_message.retain(|_, m| *m != digest);
        }

        // Groups two or more epochs behind are referenced by nothing.
        let retired: Vec<(u64, GroupId)> = ctx
            .consensus
            .epoch_groups
            .iter()
            .filter(|(epoch, _)| **epoch + 1 < proposed_epoch)
            .map(|(epoch, entry)| (*epoch, entry.group_id))
            .collect();
        for (epoch, group_id) in retired {
            ctx.consensus.epoch_groups.remove(&epoch);
            self.storage.retire_group(&group_id).await?;
            debug!(target: "machine", group = %group_id, epoch, "group retired");
        }
        Ok(())
    }

    async fn on_transaction_proposed(
        &self,
        ctx: &mut Ctx,
        block: u64,
        message: MessageDigest,
        tx_hash: B256,
        epoch: u64,
        tx: AccountTransaction,
    ) -> Result<(), MachineError> {
        let packet = AccountTransactionPacket {
            domain: PacketDomain {
                chain_id: self.config.chain_id,
                consensus: self.config.consensus_address,
            },
            epoch,
            tx_hash,
            transaction: tx,
        };
        let packet = Packet::AccountTransaction(packet);

        let digest = match self.verifier.verify(&packet, ctx.consensus.active_epoch).await {
            Ok(digest) => digest,
            Err(failure) => {
                // Untrusted input; dropped without a trace.
                sigil_telemetry::machine_metrics().inc_verification_failures();
                warn!(target: "machine", %message, %failure, "transaction proposal failed verification");
                return Ok(());
            }
        };
        if digest != message {
            warn!(target: "machine", %message, %digest, "proposal digest mismatch");
            return Ok(());
        }

        let Some(group) = self.group_for_epoch(ctx, epoch).await? else {
            warn!(target: "machine", %message, epoch, "no group serves the proposal epoch");
            return Ok(());
        };

        ctx.signing.insert(
            message,
            SigningState {
                packet,
                phase: SigningPhase::WaitingForRequest {
                    responsible: None,
                    signers: group.participant_ids().collect(),
                    deadline: block + self.config.signing_timeout_blocks,
                },
            },
        );
        Ok(())
    }

    async fn on_transaction_attested(
        &self,
        ctx: &mut Ctx,
        message: MessageDigest,
    ) -> Result<(), MachineError> {
        if ctx.signing.remove(&message).is_none() {
            return Ok(());
        }
        let sessions: Vec<SignatureId> = ctx
            .consensus
            .signature_to_message
            .iter()
            .filter(|(_, m)| **m == message)
            .map(|(sid, _)| *sid)
            .collect();
        for sid in sessions {
            ctx.consensus.signature_to_message.remove(&sid);
            self.signing.close_session(&sid).await?;
        }
        debug!(target: "machine", %message, "attested transaction closed");
        Ok(())
    }
}

/// Splits a client result: hard faults propagate, protocol violations on
/// untrusted input come back for drop-with-warning handling.
fn soften<T>(result: Result<T, MachineError>) -> Result<Result<T, ProtocolError>, MachineError> {
    match result {
        Ok(v) => Ok(Ok(v)),
        Err(MachineError::Protocol(violation)) => Ok(Err(violation)),
        Err(fault) => Err(fault),
    }
}

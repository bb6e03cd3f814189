// Path: crates/machine/src/machine/timeouts.rs

//! Deadline handling: timeouts are first-class state transitions, not
//! errors. Every deadline fires at `block == deadline + 1`.
//!
//! Key-gen phases that time out restart with the reduced set of peers that
//! did respond (same threshold, fresh group id) or skip the epoch when the
//! remainder falls below threshold. Signing phases follow the
//! responsibility rule: one scheduled retry per round, universal fallback
//! after one timeout, abandonment after the second.

use sigil_api::storage::{GroupStore, SigningSessionStore, ValidatorStorage};
use sigil_types::action::Action;
use sigil_types::error::ProtocolError;
use sigil_types::group::{Group, Participant};
use sigil_types::ids::{GroupId, MessageDigest, ParticipantId, SignatureId};
use sigil_types::packet::Packet;
use sigil_types::state::{RolloverState, SigningPhase};
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::{Ctx, Machine};
use crate::error::MachineError;

impl<S> Machine<S>
where
    S: ValidatorStorage + 'static,
{
    pub(crate) async fn apply_keygen_timeouts(
        &self,
        ctx: &mut Ctx,
        block: u64,
    ) -> Result<(), MachineError> {
        match ctx.rollover.clone() {
            RolloverState::CollectingCommitments { group_id, next_epoch, deadline }
                if block > deadline =>
            {
                let committed: BTreeSet<ParticipantId> =
                    self.keygen.committed_participants(&group_id).await?.into_iter().collect();
                self.restart_reduced(ctx, block, group_id, next_epoch, &committed).await
            }
            RolloverState::CollectingShares {
                group_id, next_epoch, deadline, missing_shares_from, ..
            } if block > deadline => {
                let responded = self
                    .group_members(&group_id)
                    .await?
                    .into_iter()
                    .map(|p| p.id)
                    .filter(|id| !missing_shares_from.contains(id))
                    .collect::<BTreeSet<_>>();
                self.restart_reduced(ctx, block, group_id, next_epoch, &responded).await
            }
            RolloverState::CollectingConfirmations {
                group_id,
                next_epoch,
                complaints,
                response_deadline,
                deadline,
                confirmations_from,
                ..
            } => {
                // An accused participant that never answered its complaint
                // is treated as proven bad: the ceremony cannot be salvaged.
                if !complaints.is_empty() && block > response_deadline {
                    warn!(
                        target: "machine",
                        group = %group_id,
                        outstanding = complaints.len(),
                        "complaints unanswered past response deadline; aborting"
                    );
                    self.keygen.abort(&group_id).await?;
                    ctx.rollover = RolloverState::EpochSkipped { next_epoch };
                    return Ok(());
                }
                if block > deadline {
                    return self
                        .restart_reduced(ctx, block, group_id, next_epoch, &confirmations_from)
                        .await;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Restarts key-gen with the peers that responded, keeping the aborted
    /// group's threshold. Deterministic across validators: the reduced set
    /// derives from on-chain events only, so every honest validator derives
    /// the same fresh group id.
    async fn restart_reduced(
        &self,
        ctx: &mut Ctx,
        block: u64,
        group_id: GroupId,
        next_epoch: u64,
        responsive: &BTreeSet<ParticipantId>,
    ) -> Result<(), MachineError> {
        sigil_telemetry::machine_metrics().inc_timeouts("key_gen");
        let group = self
            .storage
            .group(&group_id)
            .await?
            .ok_or(ProtocolError::UnknownGroup(group_id))?;
        let threshold = group.threshold;
        let reduced: Vec<Participant> = group
            .participants
            .iter()
            .filter(|p| responsive.contains(&p.id))
            .copied()
            .collect();

        self.keygen.abort(&group_id).await?;

        if (reduced.len() as u16) < threshold {
            warn!(
                target: "machine",
                group = %group_id,
                next_epoch,
                responsive = reduced.len(),
                threshold,
                "too few responsive participants; skipping epoch"
            );
            ctx.rollover = RolloverState::EpochSkipped { next_epoch };
            return Ok(());
        }
        if !reduced.iter().any(|p| p.address == self.config.self_address) {
            // We were among the unresponsive; stand down and let the
            // reduced set proceed without us.
            ctx.rollover = RolloverState::EpochSkipped { next_epoch };
            return Ok(());
        }

        info!(
            target: "machine",
            group = %group_id,
            next_epoch,
            reduced = reduced.len(),
            "key-gen timed out; restarting with reduced set"
        );
        self.start_keygen(ctx, block, next_epoch, reduced, threshold).await
    }

    pub(crate) async fn apply_signing_timeouts(
        &self,
        ctx: &mut Ctx,
        block: u64,
    ) -> Result<(), MachineError> {
        let digests: Vec<MessageDigest> = ctx.signing.keys().copied().collect();
        for digest in digests {
            let Some(entry) = ctx.signing.get(&digest) else {
                continue;
            };
            match entry.phase.clone() {
                SigningPhase::WaitingForRequest { responsible, signers, deadline }
                    if block > deadline =>
                {
                    self.request_timeout(ctx, block, digest, responsible, signers).await?;
                }
                SigningPhase::WaitingForAttestation { signature_id, responsible, deadline }
                    if block > deadline =>
                {
                    self.attestation_timeout(ctx, block, digest, signature_id, responsible)
                        .await?;
                }
                SigningPhase::CollectNonceCommitments { signature_id, last_signer, deadline }
                    if block > deadline =>
                {
                    let missing = self.signing.missing_nonce_peers(&signature_id).await?;
                    self.collect_timeout(ctx, block, digest, signature_id, last_signer, missing)
                        .await?;
                }
                SigningPhase::CollectSigningShares {
                    signature_id, shares_from, last_signer, deadline,
                } if block > deadline => {
                    let signers = self
                        .storage
                        .signers(&signature_id)
                        .await?
                        .unwrap_or_default();
                    let missing: BTreeSet<ParticipantId> =
                        signers.difference(&shares_from).copied().collect();
                    self.collect_timeout(ctx, block, digest, signature_id, last_signer, missing)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `waiting_for_request` timed out: drop the responsible party from the
    /// signer set and fall back to everyone, or abandon on the second round.
    async fn request_timeout(
        &self,
        ctx: &mut Ctx,
        block: u64,
        digest: MessageDigest,
        responsible: Option<ParticipantId>,
        mut signers: BTreeSet<ParticipantId>,
    ) -> Result<(), MachineError> {
        sigil_telemetry::machine_metrics().inc_timeouts("waiting_for_request");
        let Some(entry) = ctx.signing.get(&digest) else {
            return Ok(());
        };
        let epoch = Self::packet_epoch(&entry.packet);
        let Some(group) = self.group_for_epoch(ctx, epoch).await? else {
            ctx.signing.remove(&digest);
            return Ok(());
        };

        match responsible {
            Some(dropped) => {
                signers.remove(&dropped);
                if (signers.len() as u16) < group.threshold {
                    warn!(target: "machine", %digest, "signer set below threshold; abandoning request");
                    ctx.signing.remove(&digest);
                    return Ok(());
                }
                if let Some(entry) = ctx.signing.get_mut(&digest) {
                    entry.phase = SigningPhase::WaitingForRequest {
                        responsible: None,
                        signers,
                        deadline: block + self.config.signing_timeout_blocks,
                    };
                }
                ctx.actions.push(Action::SignRequest { group_id: group.id, message: digest });
            }
            None => {
                warn!(target: "machine", %digest, "request timed out with universal fallback; abandoning");
                ctx.signing.remove(&digest);
            }
        }
        Ok(())
    }

    /// `waiting_for_attestation` timed out: hand responsibility to everyone
    /// once, abandon after that. A validator that was itself responsible
    /// re-emits the terminal action (its submission evidently failed).
    async fn attestation_timeout(
        &self,
        ctx: &mut Ctx,
        block: u64,
        digest: MessageDigest,
        signature_id: SignatureId,
        responsible: Option<ParticipantId>,
    ) -> Result<(), MachineError> {
        sigil_telemetry::machine_metrics().inc_timeouts("waiting_for_attestation");
        ctx.consensus.signature_to_message.remove(&signature_id);

        let Some(entry) = ctx.signing.get(&digest) else {
            return Ok(());
        };
        let packet = entry.packet.clone();
        let epoch = Self::packet_epoch(&packet);
        let group = self.group_for_epoch(ctx, epoch).await?;

        match responsible {
            Some(holder) => {
                let acting =
                    group.as_ref().is_some_and(|g| self.self_id_in(g) == Some(holder));
                if let Some(entry) = ctx.signing.get_mut(&digest) {
                    entry.phase = SigningPhase::WaitingForAttestation {
                        signature_id,
                        responsible: None,
                        deadline: block + self.config.signing_timeout_blocks,
                    };
                }
                if acting {
                    self.emit_terminal(ctx, &packet, signature_id);
                }
            }
            None => {
                warn!(target: "machine", %digest, "attestation never landed; abandoning");
                ctx.signing.remove(&digest);
            }
        }
        Ok(())
    }

    /// A collection phase timed out: the missing peers are dropped from the
    /// default set and the request goes back to `waiting_for_request` with
    /// the observer of the last contribution responsible for the retry.
    async fn collect_timeout(
        &self,
        ctx: &mut Ctx,
        block: u64,
        digest: MessageDigest,
        signature_id: SignatureId,
        last_signer: Option<ParticipantId>,
        missing: BTreeSet<ParticipantId>,
    ) -> Result<(), MachineError> {
        sigil_telemetry::machine_metrics().inc_timeouts("collect");
        ctx.consensus.signature_to_message.remove(&signature_id);
        self.signing.close_session(&signature_id).await?;

        let Some(entry) = ctx.signing.get(&digest) else {
            return Ok(());
        };
        let epoch = Self::packet_epoch(&entry.packet);
        let Some(group) = self.group_for_epoch(ctx, epoch).await? else {
            ctx.signing.remove(&digest);
            return Ok(());
        };

        let reduced: BTreeSet<ParticipantId> = group
            .participant_ids()
            .filter(|id| !missing.contains(id))
            .collect();
        if (reduced.len() as u16) < group.threshold {
            warn!(target: "machine", %digest, "too few responsive signers; abandoning request");
            ctx.signing.remove(&digest);
            return Ok(());
        }

        if let Some(entry) = ctx.signing.get_mut(&digest) {
            entry.phase = SigningPhase::WaitingForRequest {
                responsible: last_signer,
                signers: reduced,
                deadline: block + self.config.signing_timeout_blocks,
            };
        }
        if last_signer.is_some() && last_signer == self.self_id_in(&group) {
            ctx.actions.push(Action::SignRequest { group_id: group.id, message: digest });
        }
        Ok(())
    }

    /// Re-emits the terminal action for a completed-but-unlanded signature.
    fn emit_terminal(&self, ctx: &mut Ctx, packet: &Packet, signature_id: SignatureId) {
        match packet {
            Packet::EpochRollover(p) => {
                let group_id = ctx
                    .consensus
                    .group_for_epoch(p.proposed_epoch)
                    .map(|e| e.group_id);
                if let Some(group_id) = group_id {
                    ctx.actions.push(Action::StageEpoch {
                        proposed_epoch: p.proposed_epoch,
                        rollover_block: p.rollover_block,
                        group_id,
                        signature_id,
                    });
                }
            }
            Packet::AccountTransaction(p) => {
                ctx.actions.push(Action::AttestTransaction {
                    epoch: p.epoch,
                    tx_hash: p.tx_hash,
                    signature_id,
                });
            }
        }
    }

    async fn group_members(&self, group_id: &GroupId) -> Result<Vec<Participant>, MachineError> {
        Ok(self
            .storage
            .group(group_id)
            .await?
            .map(|g: Group| g.participants)
            .unwrap_or_default())
    }
}

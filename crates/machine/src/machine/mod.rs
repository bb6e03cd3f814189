// Path: crates/machine/src/machine/mod.rs

//! The protocol state machine.
//!
//! `apply` consumes one transition and produces a [`StateDiff`] plus the
//! actions it implies. Transitions are applied serially in `(block,
//! log_index)` order; a regressing position is rejected as a watcher bug.
//!
//! The handling order for a block tick is fixed: key-gen timeouts, signing
//! timeouts, stale-ceremony abort, the genesis trigger, and finally the
//! epoch-rollover check. Events dispatch by kind and re-run the rollover
//! check afterwards so an in-event-block rollover is issued immediately.

mod events;
mod timeouts;

use parking_lot::Mutex;
use sigil_api::storage::{GroupStore, StateStore, ValidatorStorage};
use sigil_types::action::Action;
use sigil_types::config::ValidatorConfig;
use sigil_types::event::Transition;
use sigil_types::group::{normalize_participants, Group, GroupContext, Participant};
use sigil_types::ids::{MessageDigest, ParticipantId};
use sigil_types::packet::{Packet, PacketDomain};
use sigil_types::state::{
    MutableConsensusState, RolloverState, SigningState, StateDiff,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::MachineError;
use crate::keygen::KeygenClient;
use crate::signing::SigningClient;
use crate::verify::PacketVerifier;

/// The result of applying one transition.
#[derive(Debug, Default)]
pub struct Applied {
    /// The structured state change, to be committed atomically.
    pub diff: StateDiff,
    /// Outbound actions, in emission order.
    pub actions: Vec<Action>,
}

/// The mutable working copy one transition operates on. The diff is computed
/// by comparing against the loaded snapshot, so handlers mutate freely.
pub(crate) struct Ctx {
    pub rollover: RolloverState,
    pub signing: BTreeMap<MessageDigest, SigningState>,
    pub consensus: MutableConsensusState,
    pub actions: Vec<Action>,
}

/// The protocol state machine (one per validator).
pub struct Machine<S> {
    pub(crate) config: ValidatorConfig,
    pub(crate) storage: Arc<S>,
    pub(crate) verifier: PacketVerifier,
    pub(crate) keygen: KeygenClient<S>,
    pub(crate) signing: SigningClient<S>,
    last_position: Mutex<Option<(u64, u64)>>,
}

impl<S> Machine<S>
where
    S: ValidatorStorage + 'static,
{
    /// Builds the machine and its collaborator clients.
    pub fn new(config: ValidatorConfig, storage: Arc<S>) -> Self {
        let verifier = PacketVerifier::new(
            PacketDomain { chain_id: config.chain_id, consensus: config.consensus_address },
            config.blocks_per_epoch,
            storage.clone(),
        );
        let keygen = KeygenClient::new(storage.clone(), config.self_address);
        let signing = SigningClient::new(storage.clone(), config.nonce_tree_size);
        Machine { config, storage, verifier, keygen, signing, last_position: Mutex::new(None) }
    }

    /// Builds the machine with externally constructed collaborators
    /// (seeded clients in tests).
    pub fn with_parts(
        config: ValidatorConfig,
        storage: Arc<S>,
        verifier: PacketVerifier,
        keygen: KeygenClient<S>,
        signing: SigningClient<S>,
    ) -> Self {
        Machine { config, storage, verifier, keygen, signing, last_position: Mutex::new(None) }
    }

    /// Applies one transition, returning the diff and the actions it
    /// produced. The caller commits both atomically together with the
    /// watcher cursor.
    pub async fn apply(&self, transition: &Transition) -> Result<Applied, MachineError> {
        self.check_order(transition)?;

        let rollover = self.storage.rollover().await?;
        let signing = self.storage.signing_entries().await?;
        let consensus = self.storage.consensus().await?;

        let mut ctx = Ctx {
            rollover: rollover.clone(),
            signing: signing.clone(),
            consensus: consensus.clone(),
            actions: Vec::new(),
        };

        match transition {
            Transition::BlockTick { block } => {
                self.apply_keygen_timeouts(&mut ctx, *block).await?;
                self.apply_signing_timeouts(&mut ctx, *block).await?;
                self.apply_stale_ceremony_check(&mut ctx).await?;
                self.apply_genesis_trigger(&mut ctx, *block).await?;
                self.apply_rollover_check(&mut ctx, *block).await?;
            }
            Transition::Event { block, event, .. } => {
                self.dispatch_event(&mut ctx, *block, event).await?;
                self.apply_rollover_check(&mut ctx, *block).await?;
            }
        }

        let mut diff = StateDiff::default();
        if ctx.rollover != rollover {
            diff.rollover = Some(ctx.rollover);
        }
        if ctx.consensus != consensus {
            diff.consensus = Some(ctx.consensus);
        }
        for (digest, entry) in &ctx.signing {
            if signing.get(digest) != Some(entry) {
                diff.signing_upserts.insert(*digest, entry.clone());
            }
        }
        for digest in signing.keys() {
            if !ctx.signing.contains_key(digest) {
                diff.signing_removals.insert(*digest);
            }
        }

        Ok(Applied { diff, actions: ctx.actions })
    }

    fn check_order(&self, transition: &Transition) -> Result<(), MachineError> {
        let position = transition.position();
        let mut last = self.last_position.lock();
        if let Some((last_block, last_index)) = *last {
            if position < (last_block, last_index) {
                return Err(MachineError::OutOfOrder {
                    last_block,
                    last_index,
                    block: position.0,
                    index: position.1,
                });
            }
        }
        *last = Some(position);
        Ok(())
    }

    /// The genesis trigger: no group exists yet and the chain is live.
    async fn apply_genesis_trigger(&self, ctx: &mut Ctx, block: u64) -> Result<(), MachineError> {
        if ctx.consensus.active_epoch != 0
            || ctx.consensus.genesis_group_id.is_some()
            || !matches!(ctx.rollover, RolloverState::WaitingForGenesis)
        {
            return Ok(());
        }
        let participants = self.default_participants();
        let threshold = derive_threshold(participants.len() as u16);
        info!(target: "machine", block, "genesis trigger: starting key-gen for epoch 1");
        self.start_keygen(ctx, block, 1, participants, threshold).await
    }

    /// The epoch-rollover check: issue the next epoch's key-gen once its
    /// boundary block is reached and no rollover is in flight.
    async fn apply_rollover_check(&self, ctx: &mut Ctx, block: u64) -> Result<(), MachineError> {
        let active = ctx.consensus.active_epoch;
        if active == 0 {
            return Ok(());
        }
        if !matches!(
            ctx.rollover,
            RolloverState::WaitingForRollover | RolloverState::EpochSkipped { .. }
        ) {
            return Ok(());
        }
        if block < (active + 1) * self.config.blocks_per_epoch {
            return Ok(());
        }
        let participants = self.default_participants();
        let threshold = derive_threshold(participants.len() as u16);
        info!(
            target: "machine",
            block,
            next_epoch = active + 1,
            "epoch boundary reached: starting rollover key-gen"
        );
        self.start_keygen(ctx, block, active + 1, participants, threshold).await
    }

    /// A ceremony for an epoch the chain has already reached is stale.
    async fn apply_stale_ceremony_check(&self, ctx: &mut Ctx) -> Result<(), MachineError> {
        let (group_id, next_epoch) = match &ctx.rollover {
            RolloverState::CollectingCommitments { group_id, next_epoch, .. }
            | RolloverState::CollectingShares { group_id, next_epoch, .. }
            | RolloverState::CollectingConfirmations { group_id, next_epoch, .. }
            | RolloverState::SignRollover { group_id, next_epoch, .. } => (*group_id, *next_epoch),
            _ => return Ok(()),
        };
        if next_epoch > ctx.consensus.active_epoch {
            return Ok(());
        }
        warn!(
            target: "machine",
            group = %group_id,
            next_epoch,
            active_epoch = ctx.consensus.active_epoch,
            "aborting stale key-gen ceremony"
        );
        self.keygen.abort(&group_id).await?;
        ctx.rollover = RolloverState::WaitingForRollover;
        Ok(())
    }

    /// Opens a key-gen ceremony: derives the group, persists this
    /// validator's material, emits `KeyGenStart`, and tracks the phase.
    pub(crate) async fn start_keygen(
        &self,
        ctx: &mut Ctx,
        block: u64,
        next_epoch: u64,
        participants: Vec<Participant>,
        threshold: u16,
    ) -> Result<(), MachineError> {
        let salt = if ctx.consensus.genesis_group_id.is_none() && next_epoch == 1 {
            self.config.genesis_salt
        } else {
            0
        };
        let context =
            GroupContext { consensus: self.config.consensus_address, epoch: next_epoch, salt };

        let count = participants.len() as u16;
        let setup = self.keygen.setup(participants.clone(), threshold, context).await?;

        ctx.actions.push(Action::KeyGenStart {
            participants_root: setup.group.participants_root,
            participants,
            count,
            threshold,
            context,
            self_id: setup.self_id,
            commitments: setup.commitments,
            pok: setup.pok,
            participant_proof: setup.participant_proof,
        });
        ctx.rollover = RolloverState::CollectingCommitments {
            group_id: setup.group.id,
            next_epoch,
            deadline: block + self.config.key_gen_timeout_blocks,
        };
        Ok(())
    }

    /// The default participant set, normalized.
    pub(crate) fn default_participants(&self) -> Vec<Participant> {
        normalize_participants(self.config.participants.clone()).unwrap_or_default()
    }

    /// This validator's id inside a group, if it is a member.
    pub(crate) fn self_id_in(&self, group: &Group) -> Option<ParticipantId> {
        group
            .participants
            .iter()
            .find(|p| p.address == self.config.self_address)
            .map(|p| p.id)
    }

    /// The epoch whose group must sign a packet.
    pub(crate) fn packet_epoch(packet: &Packet) -> u64 {
        match packet {
            Packet::EpochRollover(p) => p.active_epoch,
            Packet::AccountTransaction(p) => p.epoch,
        }
    }

    /// Loads the group serving `epoch`, if both the mapping and the record
    /// exist.
    pub(crate) async fn group_for_epoch(
        &self,
        ctx: &Ctx,
        epoch: u64,
    ) -> Result<Option<Group>, MachineError> {
        let Some(entry) = ctx.consensus.group_for_epoch(epoch) else {
            return Ok(None);
        };
        Ok(self.storage.group(&entry.group_id).await?)
    }
}

/// The threshold for a fresh group: `⌈2n/3⌉` of its participants. Reduced
/// restarts keep the aborted group's threshold instead.
pub(crate) fn derive_threshold(count: u16) -> u16 {
    (2 * count).div_ceil(3)
}

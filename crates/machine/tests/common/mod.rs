// Path: crates/machine/tests/common/mod.rs

//! A deterministic multi-validator harness.
//!
//! Plays the coordinator/consensus contracts: validator actions are turned
//! back into chain events and fed to every node in `(block, log_index)`
//! order, exactly as the watcher would deliver them.

use alloy_primitives::Address;
use sigil_api::storage::StateStore;
use sigil_machine::keygen::KeygenClient;
use sigil_machine::signing::SigningClient;
use sigil_machine::verify::PacketVerifier;
use sigil_machine::Machine;
use sigil_storage::MemoryStore;
use sigil_types::action::Action;
use sigil_types::config::{SubmitterConfig, ValidatorConfig, WatcherConfig};
use sigil_types::event::{ChainEvent, Transition};
use sigil_types::group::Participant;
use sigil_types::ids::{GroupId, ParticipantId};
use sigil_types::packet::PacketDomain;
use std::sync::Arc;

pub const CHAIN_ID: u64 = 1;

pub fn consensus_address() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn participant_address(id: ParticipantId) -> Address {
    Address::repeat_byte(id as u8)
}

pub struct Node {
    pub id: ParticipantId,
    pub storage: Arc<MemoryStore>,
    pub machine: Machine<MemoryStore>,
}

pub struct Net {
    pub nodes: Vec<Node>,
    pub block: u64,
    pub log_index: u64,
}

pub fn base_config(count: u16, key_gen_timeout: u64) -> ValidatorConfig {
    ValidatorConfig {
        chain_id: CHAIN_ID,
        consensus_address: consensus_address(),
        coordinator_address: Address::repeat_byte(0xbb),
        self_address: participant_address(1),
        participants: (1..=count)
            .map(|id| Participant { id, address: participant_address(id) })
            .collect(),
        genesis_salt: 0,
        blocks_per_epoch: 40,
        key_gen_timeout_blocks: key_gen_timeout,
        signing_timeout_blocks: 20,
        nonce_tree_size: 16,
        nonce_low_water_mark: 2,
        watcher: WatcherConfig::default(),
        submitter: SubmitterConfig::default(),
    }
}

impl Net {
    /// A network of `count` validators with deterministic client seeds.
    pub fn new(count: u16, key_gen_timeout: u64) -> Self {
        let nodes = (1..=count)
            .map(|id| {
                let mut config = base_config(count, key_gen_timeout);
                config.self_address = participant_address(id);

                let storage = Arc::new(MemoryStore::new());
                let verifier = PacketVerifier::new(
                    PacketDomain { chain_id: CHAIN_ID, consensus: consensus_address() },
                    config.blocks_per_epoch,
                    storage.clone(),
                );
                let keygen =
                    KeygenClient::with_seed(storage.clone(), config.self_address, [id as u8; 32]);
                let signing = SigningClient::with_seed(
                    storage.clone(),
                    config.nonce_tree_size,
                    [0x40 + id as u8; 32],
                );
                let machine =
                    Machine::with_parts(config, storage.clone(), verifier, keygen, signing);
                Node { id, storage, machine }
            })
            .collect();
        Net { nodes, block: 0, log_index: 0 }
    }

    async fn apply(&mut self, transition: Transition) -> Vec<Vec<Action>> {
        let mut per_node = Vec::new();
        for node in &self.nodes {
            let applied = node.machine.apply(&transition).await.unwrap();
            node.storage
                .commit_transition(CHAIN_ID, transition.block(), applied.diff)
                .await
                .unwrap();
            per_node.push(applied.actions);
        }
        per_node
    }

    /// Delivers a block tick, returning each node's actions.
    pub async fn tick(&mut self, block: u64) -> Vec<Vec<Action>> {
        assert!(block >= self.block, "harness fed a regressing tick");
        self.block = block;
        self.log_index = 0;
        self.apply(Transition::BlockTick { block }).await
    }

    /// Delivers one event at the current block, returning each node's actions.
    pub async fn event(&mut self, event: ChainEvent) -> Vec<Vec<Action>> {
        let transition = Transition::Event {
            block: self.block,
            log_index: self.log_index,
            event,
        };
        self.log_index += 1;
        self.apply(transition).await
    }

    /// Moves the harness clock without emitting a tick (the watcher only
    /// ticks blocks it observed; tests skip quiet stretches the same way).
    pub fn advance_to(&mut self, block: u64) {
        assert!(block >= self.block);
        self.block = block;
        self.log_index = 0;
    }

    pub fn node(&self, id: ParticipantId) -> &Node {
        self.nodes.iter().find(|n| n.id == id).unwrap()
    }
}

/// Flattens one node's actions, asserting how many it produced.
pub fn single_action(actions: &[Action]) -> &Action {
    assert_eq!(actions.len(), 1, "expected exactly one action, got {actions:?}");
    &actions[0]
}

/// Every `KeyGenStart` in a batch, by node position.
pub fn keygen_starts(per_node: &[Vec<Action>]) -> Vec<&Action> {
    per_node
        .iter()
        .flat_map(|actions| actions.iter())
        .filter(|a| matches!(a, Action::KeyGenStart { .. }))
        .collect()
}

/// Runs a full genesis ceremony for a fresh net and returns the group id.
/// Afterwards every node has an active epoch-1 group with a linked nonce
/// tree at chunk 0.
pub async fn run_genesis(net: &mut Net) -> GroupId {
    use sigil_crypto::hash;

    let per_node = net.tick(1).await;
    let count = net.nodes.len() as u16;

    // Every validator opens with its commitments.
    let mut commit_events = Vec::new();
    let mut opened = None;
    for actions in &per_node {
        let Action::KeyGenStart {
            participants_root,
            count: action_count,
            threshold,
            context,
            self_id,
            commitments,
            pok,
            ..
        } = single_action(actions)
        else {
            panic!("expected KeyGenStart, got {actions:?}");
        };
        assert_eq!(*action_count, count);
        let group_id = hash::group_id(participants_root, *action_count, *threshold, context);
        opened.get_or_insert((group_id, *participants_root, *action_count, *threshold, *context));
        commit_events.push((group_id, *self_id, commitments.clone(), pok.clone()));
    }
    let (group_id, participants_root, action_count, threshold, context) = opened.unwrap();

    net.event(ChainEvent::KeyGen {
        group_id,
        participants_root,
        count: action_count,
        threshold,
        context,
    })
    .await;

    // Commit phase.
    let mut publishes = Vec::new();
    let total = commit_events.len();
    for (index, (gid, participant, commitments, pok)) in commit_events.into_iter().enumerate() {
        assert_eq!(gid, group_id);
        let per_node = net
            .event(ChainEvent::KeyGenCommitted {
                group_id,
                participant,
                commitments,
                pok,
                committed: index + 1 == total,
            })
            .await;
        if index + 1 == total {
            for (node, actions) in net.nodes.iter().zip(&per_node) {
                let Action::KeyGenPublishShares {
                    verification_share, encrypted_shares, ..
                } = single_action(actions)
                else {
                    panic!("expected KeyGenPublishShares, got {actions:?}");
                };
                publishes.push((node.id, *verification_share, encrypted_shares.clone()));
            }
        } else {
            assert!(per_node.iter().all(|a| a.is_empty()));
        }
    }

    // Share phase. No complaints expected on the honest path.
    let total = publishes.len();
    let mut confirmed = Vec::new();
    for (index, (participant, verification_share, encrypted_shares)) in
        publishes.into_iter().enumerate()
    {
        let per_node = net
            .event(ChainEvent::KeyGenSecretShared {
                group_id,
                participant,
                verification_share,
                encrypted_shares,
                shared: index + 1 == total,
            })
            .await;
        if index + 1 == total {
            for (node, actions) in net.nodes.iter().zip(&per_node) {
                assert!(
                    matches!(single_action(actions), Action::KeyGenConfirm { .. }),
                    "expected KeyGenConfirm from node {}",
                    node.id
                );
                confirmed.push(node.id);
            }
        } else {
            assert!(per_node.iter().all(|a| a.is_empty()), "unexpected complaint");
        }
    }

    // Confirmation phase; the last confirmation finalises the group and
    // provisions the first nonce tree.
    let total = confirmed.len();
    let mut roots = Vec::new();
    for (index, participant) in confirmed.into_iter().enumerate() {
        let per_node = net
            .event(ChainEvent::KeyGenConfirmed {
                group_id,
                participant,
                confirmed: index + 1 == total,
            })
            .await;
        if index + 1 == total {
            for (node, actions) in net.nodes.iter().zip(&per_node) {
                let Action::RegisterNonceCommitments { nonce_tree_root, .. } =
                    single_action(actions)
                else {
                    panic!("expected RegisterNonceCommitments, got {actions:?}");
                };
                roots.push((node.id, *nonce_tree_root));
            }
        }
    }

    // The chain acknowledges each tree as chunk 0.
    for (participant, root) in roots {
        net.event(ChainEvent::Preprocess {
            group_id,
            participant,
            chunk: 0,
            commitment: root,
        })
        .await;
    }

    group_id
}

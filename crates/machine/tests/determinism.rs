// Path: crates/machine/tests/determinism.rs

//! The machine is deterministic: identical inputs on identically seeded
//! validators produce identical diffs and actions, run after run.

mod common;

use common::{run_genesis, Net};
use sigil_api::storage::{GroupStore, StateStore};

/// Two separate networks with the same seeds replay the same genesis stream
/// and end in byte-identical state with byte-identical key material.
#[tokio::test]
async fn identical_streams_produce_identical_state() {
    let mut first = Net::new(3, 5);
    let mut second = Net::new(3, 5);

    let group_first = run_genesis(&mut first).await;
    let group_second = run_genesis(&mut second).await;
    assert_eq!(group_first, group_second);

    for (a, b) in first.nodes.iter().zip(&second.nodes) {
        assert_eq!(
            a.storage.consensus().await.unwrap(),
            b.storage.consensus().await.unwrap()
        );
        assert_eq!(
            a.storage.rollover().await.unwrap(),
            b.storage.rollover().await.unwrap()
        );
        let group_a = a.storage.group(&group_first).await.unwrap().unwrap();
        let group_b = b.storage.group(&group_second).await.unwrap().unwrap();
        assert_eq!(group_a, group_b);
    }
}

/// Replaying an already-applied transition (at-least-once delivery) leaves
/// the state unchanged and emits no duplicate actions.
#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let mut net = Net::new(3, 5);
    let group_id = run_genesis(&mut net).await;

    let before = net.node(1).storage.consensus().await.unwrap();
    let per_node = net
        .event(sigil_types::event::ChainEvent::Preprocess {
            group_id,
            participant: 1,
            chunk: 0,
            commitment: alloy_primitives::B256::ZERO,
        })
        .await;
    // An unknown root is a stale replay; nothing changes.
    assert!(per_node.iter().all(|a| a.is_empty()));
    assert_eq!(before, net.node(1).storage.consensus().await.unwrap());
}

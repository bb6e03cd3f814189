// Path: crates/machine/tests/keygen_timeout.rs

//! Key-gen timeout with a reduced participant set.

mod common;

use common::{consensus_address, keygen_starts, single_action, Net};
use sigil_api::storage::StateStore;
use sigil_crypto::{hash, merkle};
use sigil_types::action::Action;
use sigil_types::event::ChainEvent;
use sigil_types::group::{GroupContext, Participant};
use sigil_types::state::RolloverState;

/// Four participants, threshold three, key-gen timeout five blocks. Only
/// participants 1, 2 and 4 commit; at the tick past the refreshed deadline a
/// single fresh key-gen starts with exactly that reduced set and the same
/// threshold, and the absent participant stands down.
#[tokio::test]
async fn commitment_timeout_restarts_with_reduced_set() {
    let mut net = Net::new(4, 5);

    let per_node = net.tick(1).await;
    assert_eq!(keygen_starts(&per_node).len(), 4);

    // Collect the opening parameters and every validator's commitments.
    let mut commitments = Vec::new();
    let mut opened = None;
    for actions in &per_node {
        let Action::KeyGenStart {
            participants_root, count, threshold, context, self_id, commitments: c, pok, ..
        } = single_action(actions)
        else {
            panic!("expected KeyGenStart");
        };
        assert_eq!((*count, *threshold), (4, 3));
        let group_id = hash::group_id(participants_root, *count, *threshold, context);
        opened.get_or_insert((group_id, *participants_root, *count, *threshold, *context));
        commitments.push((*self_id, c.clone(), pok.clone()));
    }
    let (group_id, participants_root, count, threshold, context) = opened.unwrap();

    net.advance_to(35);
    net.event(ChainEvent::KeyGen {
        group_id,
        participants_root,
        count,
        threshold,
        context,
    })
    .await;

    // Participants 1, 2 and 4 commit; 3 never does. Each accepted
    // commitment refreshes the inactivity deadline to block 40.
    for (participant, c, pok) in commitments {
        if participant == 3 {
            continue;
        }
        let per_node = net
            .event(ChainEvent::KeyGenCommitted {
                group_id,
                participant,
                commitments: c,
                pok,
                committed: false,
            })
            .await;
        assert!(per_node.iter().all(|a| a.is_empty()));
    }

    // Block 41 is past the deadline: one restart, reduced set [1, 2, 4].
    let per_node = net.tick(41).await;

    let reduced: Vec<Participant> = [1u16, 2, 4]
        .into_iter()
        .map(|id| Participant { id, address: common::participant_address(id) })
        .collect();
    let expected_root = merkle::participants_root(&reduced);
    let expected_group = hash::group_id(
        &expected_root,
        3,
        3,
        &GroupContext { consensus: consensus_address(), epoch: 1, salt: 0 },
    );

    for (node, actions) in net.nodes.iter().zip(&per_node) {
        if node.id == 3 {
            assert!(actions.is_empty(), "the dropped participant must stand down");
            assert_eq!(
                node.storage.rollover().await.unwrap(),
                RolloverState::EpochSkipped { next_epoch: 1 }
            );
            continue;
        }
        let Action::KeyGenStart { participants, count, threshold, participants_root, context, .. } =
            single_action(actions)
        else {
            panic!("expected exactly one restart KeyGenStart from node {}", node.id);
        };
        assert_eq!(*count, 3);
        assert_eq!(*threshold, 3);
        assert_eq!(participants.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 4]);
        assert_eq!(
            hash::group_id(participants_root, *count, *threshold, context),
            expected_group
        );
        assert!(matches!(
            node.storage.rollover().await.unwrap(),
            RolloverState::CollectingCommitments { group_id, .. } if group_id == expected_group
        ));
    }
}

/// Below-threshold remainders skip the epoch instead of restarting.
#[tokio::test]
async fn commitment_timeout_below_threshold_skips() {
    let mut net = Net::new(4, 5);

    let per_node = net.tick(1).await;
    let Action::KeyGenStart { participants_root, count, threshold, context, self_id, commitments, pok, .. } =
        single_action(&per_node[0])
    else {
        panic!("expected KeyGenStart");
    };
    let group_id = hash::group_id(participants_root, *count, *threshold, context);

    net.advance_to(3);
    net.event(ChainEvent::KeyGen {
        group_id,
        participants_root: *participants_root,
        count: *count,
        threshold: *threshold,
        context: *context,
    })
    .await;
    // Only participant 1 commits: far below the threshold of three.
    net.event(ChainEvent::KeyGenCommitted {
        group_id,
        participant: *self_id,
        commitments: commitments.clone(),
        pok: pok.clone(),
        committed: false,
    })
    .await;

    // Deadline refreshed to 8; block 9 fires the timeout.
    let per_node = net.tick(9).await;
    for (node, actions) in net.nodes.iter().zip(&per_node) {
        assert!(actions.is_empty(), "node {} must not restart below threshold", node.id);
        assert_eq!(
            node.storage.rollover().await.unwrap(),
            RolloverState::EpochSkipped { next_epoch: 1 }
        );
    }
}

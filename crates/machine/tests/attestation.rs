// Path: crates/machine/tests/attestation.rs

//! The transaction-attestation happy path, end to end: proposal, signing
//! request, nonce reveals, share publication, completion, attestation.

mod common;

use alloy_primitives::{Address, B256, U256};
use common::{consensus_address, run_genesis, single_action, Net, CHAIN_ID};
use sigil_api::storage::StateStore;
use sigil_crypto::{frost, hash, point};
use sigil_api::storage::GroupStore;
use sigil_types::action::{Action, CallbackContext};
use sigil_types::event::ChainEvent;
use sigil_types::ids::{encode_sequence, CompressedPoint, MessageDigest, SchnorrSignature, SignatureId};
use sigil_types::packet::{AccountTransaction, AccountTransactionPacket, Operation, PacketDomain};
use sigil_types::state::SigningPhase;
use std::collections::BTreeSet;

fn proposed_transaction() -> AccountTransaction {
    AccountTransaction {
        chain_id: CHAIN_ID,
        account: Address::repeat_byte(0xb3),
        to: Address::repeat_byte(0x74),
        value: U256::ZERO,
        data: vec![0x5a, 0xfe, 0x5a, 0xfe],
        operation: Operation::Call,
        nonce: 0,
    }
}

#[tokio::test]
async fn transaction_attestation_happy_path() {
    let mut net = Net::new(3, 5);
    let group_id = run_genesis(&mut net).await;
    net.advance_to(50);
    net.tick(50).await;

    let tx_hash = B256::repeat_byte(0x77);
    let packet = AccountTransactionPacket {
        domain: PacketDomain { chain_id: CHAIN_ID, consensus: consensus_address() },
        epoch: 1,
        tx_hash,
        transaction: proposed_transaction(),
    };
    let message = hash::account_transaction_digest(&packet);

    // Proposal: verification succeeds and a waiting entry appears.
    let per_node = net
        .event(ChainEvent::TransactionProposed {
            message,
            tx_hash,
            epoch: 1,
            tx: proposed_transaction(),
        })
        .await;
    assert!(per_node.iter().all(|a| a.is_empty()));

    let entry = net.node(1).storage.signing_entry(&message).await.unwrap().unwrap();
    let SigningPhase::WaitingForRequest { responsible, signers, deadline } = entry.phase else {
        panic!("expected waiting_for_request, got {:?}", entry.phase);
    };
    assert_eq!(responsible, None);
    assert_eq!(signers, BTreeSet::from([1, 2, 3]));
    assert_eq!(deadline, 70);

    // The consensus contract opens the request; the threshold-sized signer
    // subset {1, 2} reveals nonces.
    let signature_id = SignatureId([9; 32]);
    let per_node = net
        .event(ChainEvent::Sign {
            initiator: consensus_address(),
            group_id,
            message,
            signature_id,
            sequence: encode_sequence(0, 0),
        })
        .await;

    let mut reveals: Vec<(u16, CompressedPoint, CompressedPoint)> = Vec::new();
    for (node, actions) in net.nodes.iter().zip(&per_node) {
        if node.id <= 2 {
            let Action::RevealNonceCommitments { hiding, binding, .. } = single_action(actions)
            else {
                panic!("expected RevealNonceCommitments from node {}", node.id);
            };
            reveals.push((node.id, *hiding, *binding));
        } else {
            assert!(actions.is_empty(), "node {} is not a session signer", node.id);
        }
    }

    // First reveal: nothing yet. Second reveal completes the set and every
    // session signer publishes its share with the attestation callback.
    let (first, second) = (reveals[0], reveals[1]);
    let per_node = net
        .event(ChainEvent::SignRevealedNonces {
            signature_id,
            participant: first.0,
            hiding: first.1,
            binding: first.2,
        })
        .await;
    assert!(per_node.iter().all(|a| a.is_empty()));

    let per_node = net
        .event(ChainEvent::SignRevealedNonces {
            signature_id,
            participant: second.0,
            hiding: second.1,
            binding: second.2,
        })
        .await;

    let mut shares = Vec::new();
    let mut group_commitment = None;
    for (node, actions) in net.nodes.iter().zip(&per_node) {
        if node.id <= 2 {
            let Action::PublishSignatureShare {
                share, group_commitment: r, callback, ..
            } = single_action(actions)
            else {
                panic!("expected PublishSignatureShare from node {}", node.id);
            };
            assert_eq!(
                *callback,
                Some(CallbackContext::AttestTransaction { epoch: 1, tx_hash })
            );
            shares.push((node.id, *share));
            group_commitment.get_or_insert(*r);
            assert_eq!(group_commitment, Some(*r), "group commitment must agree");
        } else {
            assert!(actions.is_empty());
        }
    }

    // The two shares aggregate into a signature that verifies against the
    // group key, exactly what the coordinator contract checks.
    let group = net.node(1).storage.group(&group_id).await.unwrap().unwrap();
    let group_public = point::decode_point(&group.public_key.unwrap()).unwrap();
    let commitment_point = point::decode_point(&group_commitment.unwrap()).unwrap();
    let (z, valid) = frost::aggregate(
        shares.iter().map(|(_, s)| point::decode_scalar(s).unwrap()),
        &commitment_point,
        &group_public,
        &message.0,
    );
    assert!(valid, "aggregated threshold signature must verify");

    // Shares land on chain; the last signer becomes responsible.
    for (participant, share) in &shares {
        net.event(ChainEvent::SignShared {
            signature_id,
            participant: *participant,
            share: *share,
        })
        .await;
    }

    let per_node = net
        .event(ChainEvent::SignCompleted {
            signature_id,
            signature: SchnorrSignature {
                r: group_commitment.unwrap(),
                z: point::encode_scalar(&z),
            },
        })
        .await;
    for (node, actions) in net.nodes.iter().zip(&per_node) {
        if node.id == 2 {
            assert_eq!(
                *single_action(actions),
                Action::AttestTransaction { epoch: 1, tx_hash, signature_id }
            );
        } else {
            assert!(actions.is_empty(), "only the last signer attests");
        }
    }

    let entry = net.node(1).storage.signing_entry(&message).await.unwrap().unwrap();
    assert!(matches!(
        entry.phase,
        SigningPhase::WaitingForAttestation { responsible: Some(2), .. }
    ));

    // The attestation lands; the entry is gone everywhere.
    let per_node = net.event(ChainEvent::TransactionAttested { message }).await;
    assert!(per_node.iter().all(|a| a.is_empty()));
    for node in &net.nodes {
        assert!(node.storage.signing_entry(&message).await.unwrap().is_none());
        assert!(node
            .storage
            .consensus()
            .await
            .unwrap()
            .signature_to_message
            .is_empty());
    }
}

/// A `Sign` whose initiator is not the consensus contract is ignored, as is
/// one for a digest this validator never verified.
#[tokio::test]
async fn sign_gate_checks() {
    let mut net = Net::new(3, 5);
    let group_id = run_genesis(&mut net).await;
    net.advance_to(50);

    let per_node = net
        .event(ChainEvent::Sign {
            initiator: Address::repeat_byte(0xee),
            group_id,
            message: MessageDigest([1; 32]),
            signature_id: SignatureId([2; 32]),
            sequence: 0,
        })
        .await;
    assert!(per_node.iter().all(|a| a.is_empty()));

    let per_node = net
        .event(ChainEvent::Sign {
            initiator: consensus_address(),
            group_id,
            message: MessageDigest([1; 32]),
            signature_id: SignatureId([2; 32]),
            sequence: 0,
        })
        .await;
    assert!(per_node.iter().all(|a| a.is_empty()));
    for node in &net.nodes {
        assert!(node.storage.consensus().await.unwrap().signature_to_message.is_empty());
    }
}

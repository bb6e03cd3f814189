// Path: crates/submitter/tests/outbox.rs

//! Outbox behaviour against a scripted chain endpoint: fee bumping, nonce
//! reconciliation, and strict nonce ordering.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use sigil_api::chain::{ActionEncoder, BlockTag, ChainRpc, LogFilter, WireError};
use sigil_api::storage::{OutboxStore, SubmissionEntry, SubmissionStatus};
use sigil_crypto::hash::action_id;
use sigil_storage::MemoryStore;
use sigil_submitter::Submitter;
use sigil_types::action::Action;
use sigil_types::chain::{BlockRef, FeeEstimate, LogEntry, RawTransaction};
use sigil_types::config::SubmitterConfig;
use sigil_types::error::ChainError;
use sigil_types::ids::{GroupId, MessageDigest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct ScriptedRpc {
    pending_nonce: AtomicU64,
    latest_nonce: AtomicU64,
    fees: FeeEstimate,
    send_script: Mutex<VecDeque<Result<B256, ChainError>>>,
    sent: Mutex<Vec<RawTransaction>>,
}

impl ScriptedRpc {
    fn new(pending: u64, latest: u64, fees: FeeEstimate) -> Self {
        ScriptedRpc {
            pending_nonce: AtomicU64::new(pending),
            latest_nonce: AtomicU64::new(latest),
            fees,
            send_script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn script_send(&self, result: Result<B256, ChainError>) {
        self.send_script.lock().push_back(result);
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(0)
    }
    async fn block_by_number(&self, _n: u64) -> Result<Option<BlockRef>, ChainError> {
        Ok(None)
    }
    async fn block_by_hash(&self, _h: B256) -> Result<Option<BlockRef>, ChainError> {
        Ok(None)
    }
    async fn logs(&self, _f: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        Ok(vec![])
    }
    async fn logs_by_block_hash(
        &self,
        _h: B256,
        _f: &LogFilter,
    ) -> Result<Vec<LogEntry>, ChainError> {
        Ok(vec![])
    }
    async fn transaction_count(&self, _a: Address, tag: BlockTag) -> Result<u64, ChainError> {
        Ok(match tag {
            // Each allocation observes one more queued transaction.
            BlockTag::Pending => self.pending_nonce.fetch_add(1, Ordering::SeqCst),
            BlockTag::Latest => self.latest_nonce.load(Ordering::SeqCst),
        })
    }
    async fn estimate_fees(&self) -> Result<FeeEstimate, ChainError> {
        Ok(self.fees)
    }
    async fn send_raw_transaction(&self, tx: &RawTransaction) -> Result<B256, ChainError> {
        let result = self
            .send_script
            .lock()
            .pop_front()
            .unwrap_or(Ok(B256::repeat_byte(0xcc)));
        if result.is_ok() {
            self.sent.lock().push(tx.clone());
        }
        result
    }
}

/// Encodes `(nonce, fees)` so assertions can read back what was signed.
struct RecordingEncoder;

#[async_trait]
impl ActionEncoder for RecordingEncoder {
    fn sender(&self) -> Address {
        Address::repeat_byte(0x11)
    }

    async fn encode(
        &self,
        _action: &Action,
        nonce: u64,
        fees: FeeEstimate,
    ) -> Result<RawTransaction, WireError> {
        let mut bytes = nonce.to_be_bytes().to_vec();
        bytes.extend(fees.max_fee_per_gas.to_be_bytes());
        bytes.extend(fees.max_priority_fee_per_gas.to_be_bytes());
        Ok(RawTransaction(bytes))
    }
}

fn decode_sent(tx: &RawTransaction) -> (u64, FeeEstimate) {
    let nonce = u64::from_be_bytes(tx.0[..8].try_into().unwrap());
    let max_fee = u128::from_be_bytes(tx.0[8..24].try_into().unwrap());
    let priority = u128::from_be_bytes(tx.0[24..40].try_into().unwrap());
    (nonce, FeeEstimate { max_fee_per_gas: max_fee, max_priority_fee_per_gas: priority })
}

fn sample_action(tag: u8) -> Action {
    Action::SignRequest {
        group_id: GroupId([tag; 32]),
        message: MessageDigest([tag; 32]),
    }
}

async fn seed_entry(
    storage: &MemoryStore,
    nonce: u64,
    last_fees: Option<FeeEstimate>,
    last_hash: Option<B256>,
) {
    let action = sample_action(nonce as u8);
    storage
        .append(&SubmissionEntry {
            nonce,
            action_id: action_id(&action).unwrap(),
            action,
            raw_tx: RawTransaction(vec![]),
            last_fees,
            last_hash,
            status: SubmissionStatus::Submitted,
        })
        .await
        .unwrap();
}

/// A stuck entry is re-signed at 101% of the componentwise maximum of its
/// stored fees and the fresh estimate, and the new fees and hash persist.
#[tokio::test]
async fn stuck_entry_is_fee_bumped() {
    let storage = Arc::new(MemoryStore::new());
    let rpc = Arc::new(ScriptedRpc::new(
        11,
        10,
        FeeEstimate { max_fee_per_gas: 200, max_priority_fee_per_gas: 100 },
    ));
    let submitter = Submitter::new(
        SubmitterConfig::default(),
        storage.clone(),
        rpc.clone(),
        Arc::new(RecordingEncoder),
    );

    seed_entry(
        &storage,
        10,
        Some(FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 50 }),
        Some(B256::repeat_byte(0x01)),
    )
    .await;
    rpc.script_send(Ok(B256::repeat_byte(0x02)));

    submitter.pump(7).await.unwrap();

    let sent = rpc.sent.lock();
    assert_eq!(sent.len(), 1);
    let (nonce, fees) = decode_sent(&sent[0]);
    assert_eq!(nonce, 10);
    assert_eq!(fees, FeeEstimate { max_fee_per_gas: 202, max_priority_fee_per_gas: 101 });

    let entries = storage.unexecuted().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].last_fees, Some(fees));
    assert_eq!(entries[0].last_hash, Some(B256::repeat_byte(0x02)));
    assert_eq!(entries[0].status, SubmissionStatus::Submitted);
}

/// A nonce-too-low rejection (wrapped inside an execution error) reconciles
/// the entry as executed without touching its recorded hash.
#[tokio::test]
async fn nonce_too_low_reconciles_without_rewriting_hash() {
    let storage = Arc::new(MemoryStore::new());
    let rpc = Arc::new(ScriptedRpc::new(
        11,
        10,
        FeeEstimate { max_fee_per_gas: 200, max_priority_fee_per_gas: 100 },
    ));
    let submitter = Submitter::new(
        SubmitterConfig::default(),
        storage.clone(),
        rpc.clone(),
        Arc::new(RecordingEncoder),
    );

    let prior_hash = B256::repeat_byte(0x0a);
    seed_entry(&storage, 10, None, Some(prior_hash)).await;
    rpc.script_send(Err(ChainError::Execution(
        "replacement rejected: nonce too low".into(),
    )));

    submitter.pump(7).await.unwrap();
    assert!(storage.unexecuted().await.unwrap().is_empty());

    // No retry happens at this nonce on the next tick.
    submitter.pump(8).await.unwrap();
    assert!(rpc.sent.lock().is_empty());
}

/// Entries go out strictly in nonce order; a send failure stops the tick and
/// the next tick resumes from the stuck entry.
#[tokio::test]
async fn sends_in_nonce_order_and_stops_on_failure() {
    let storage = Arc::new(MemoryStore::new());
    let rpc = Arc::new(ScriptedRpc::new(
        5,
        5,
        FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 10 },
    ));
    let submitter = Submitter::new(
        SubmitterConfig::default(),
        storage.clone(),
        rpc.clone(),
        Arc::new(RecordingEncoder),
    );

    assert_eq!(submitter.enqueue(sample_action(1)).await.unwrap(), 5);
    assert_eq!(submitter.enqueue(sample_action(2)).await.unwrap(), 6);
    assert_eq!(submitter.enqueue(sample_action(3)).await.unwrap(), 7);

    rpc.script_send(Ok(B256::repeat_byte(0x01)));
    rpc.script_send(Err(ChainError::Transport("gateway down".into())));

    submitter.pump(1).await.unwrap();
    {
        let sent = rpc.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(decode_sent(&sent[0]).0, 5);
    }

    let entries = storage.unexecuted().await.unwrap();
    assert_eq!(entries[0].status, SubmissionStatus::Submitted);
    assert_eq!(entries[1].status, SubmissionStatus::Pending);
    assert_eq!(entries[2].status, SubmissionStatus::Pending);

    // Nonce 5 confirms; the next tick retries 6 first, then 7: the outbox
    // never has a hole in front of a submitted entry.
    rpc.latest_nonce.store(6, Ordering::SeqCst);
    submitter.pump(2).await.unwrap();
    let sent = rpc.sent.lock();
    assert_eq!(sent.len(), 3);
    assert_eq!(decode_sent(&sent[1]).0, 6);
    assert_eq!(decode_sent(&sent[2]).0, 7);
}

/// Confirmed nonces are bulk-reconciled before anything is sent.
#[tokio::test]
async fn confirmed_entries_are_bulk_marked() {
    let storage = Arc::new(MemoryStore::new());
    let rpc = Arc::new(ScriptedRpc::new(
        13,
        12,
        FeeEstimate { max_fee_per_gas: 100, max_priority_fee_per_gas: 10 },
    ));
    let submitter = Submitter::new(
        SubmitterConfig::default(),
        storage.clone(),
        rpc.clone(),
        Arc::new(RecordingEncoder),
    );

    seed_entry(&storage, 10, None, Some(B256::repeat_byte(1))).await;
    seed_entry(&storage, 11, None, Some(B256::repeat_byte(2))).await;
    seed_entry(&storage, 12, None, None).await;
    rpc.script_send(Ok(B256::repeat_byte(3)));

    submitter.pump(1).await.unwrap();

    // 10 and 11 confirmed; only 12 went out.
    let sent = rpc.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(decode_sent(&sent[0]).0, 12);
    let entries = storage.unexecuted().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].nonce, 12);
}

// Path: crates/watcher/tests/stream.rs

//! Transition-stream behaviour against a scripted endpoint: warp ordering,
//! bloom pruning, overflow splitting, fallible drops, and the reorg window.

use alloy_primitives::{Address, Bloom, BloomInput, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use sigil_api::chain::{BlockTag, ChainRpc, LogCodec, LogFilter, WireError};
use sigil_types::chain::{BlockRef, FeeEstimate, LogEntry, RawTransaction};
use sigil_types::codec::{from_bytes_canonical, to_bytes_canonical};
use sigil_types::config::WatcherConfig;
use sigil_types::error::ChainError;
use sigil_types::event::{ChainEvent, EventKind, Transition};
use sigil_types::ids::MessageDigest;
use sigil_watcher::{Watcher, WatcherError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

fn watched() -> Address {
    Address::repeat_byte(0xaa)
}

/// Selector = a recognisable prefix plus the kind's position in the
/// declaration order; payload = the canonical event bytes.
struct TestCodec;

impl TestCodec {
    fn selector_for(kind: EventKind) -> B256 {
        let index = EventKind::ALL.iter().position(|k| *k == kind).unwrap() as u8;
        let mut bytes = [0u8; 32];
        bytes[0] = 0x51;
        bytes[1] = index;
        B256::from(bytes)
    }
}

impl LogCodec for TestCodec {
    fn watched_addresses(&self) -> Vec<Address> {
        vec![watched()]
    }
    fn selector(&self, kind: EventKind) -> B256 {
        Self::selector_for(kind)
    }
    fn kind_of(&self, topic0: &B256) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|k| Self::selector_for(*k) == *topic0)
    }
    fn decode(&self, log: &LogEntry) -> Result<Option<ChainEvent>, WireError> {
        let kind = match log.topics.first().and_then(|t| self.kind_of(t)) {
            Some(kind) => kind,
            None => return Ok(None),
        };
        from_bytes_canonical(&log.data)
            .map(Some)
            .map_err(|e| WireError::Decode { kind: kind.name(), reason: e.to_string() })
    }
}

fn attested(byte: u8) -> ChainEvent {
    ChainEvent::TransactionAttested { message: MessageDigest([byte; 32]) }
}

fn event_log(event: &ChainEvent, block: u64, log_index: u64) -> LogEntry {
    LogEntry {
        address: watched(),
        topics: vec![TestCodec::selector_for(event.kind())],
        data: to_bytes_canonical(event).unwrap(),
        block_number: block,
        block_hash: block_hash(block),
        log_index,
    }
}

fn block_hash(number: u64) -> B256 {
    B256::repeat_byte(number as u8 + 1)
}

fn block_ref(number: u64, with_logs: bool) -> BlockRef {
    let mut bloom = Bloom::default();
    if with_logs {
        bloom.accrue(BloomInput::Raw(watched().as_slice()));
    }
    BlockRef {
        number,
        hash: block_hash(number),
        parent_hash: if number == 0 { B256::ZERO } else { block_hash(number - 1) },
        logs_bloom: bloom,
    }
}

#[derive(Default)]
struct ScriptedChain {
    head: Mutex<u64>,
    blocks: Mutex<BTreeMap<u64, BlockRef>>,
    logs: Mutex<Vec<LogEntry>>,
    // Range queries fail while the span is wider than this; 0 disables.
    fail_ranges_wider_than: Mutex<Option<u64>>,
    // Per-event queries for these selectors always fail.
    poisoned_selectors: Mutex<Vec<B256>>,
}

impl ScriptedChain {
    fn matching(&self, filter: &LogFilter, logs: &[LogEntry]) -> Vec<LogEntry> {
        logs.iter()
            .filter(|l| {
                filter.topic0.is_empty()
                    || l.topics.first().is_some_and(|t| filter.topic0.contains(t))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChainRpc for ScriptedChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(*self.head.lock())
    }
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockRef>, ChainError> {
        Ok(self.blocks.lock().get(&number).cloned())
    }
    async fn block_by_hash(&self, hash: B256) -> Result<Option<BlockRef>, ChainError> {
        Ok(self.blocks.lock().values().find(|b| b.hash == hash).cloned())
    }
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        let (from, to) = (filter.from_block.unwrap_or(0), filter.to_block.unwrap_or(u64::MAX));
        // Only the combined (selector-less) queries are failed; the
        // per-event fallback queries go through.
        if filter.topic0.is_empty() {
            if let Some(limit) = *self.fail_ranges_wider_than.lock() {
                if to.saturating_sub(from) + 1 > limit {
                    return Err(ChainError::Transport("range too wide".into()));
                }
            }
        }
        for poisoned in self.poisoned_selectors.lock().iter() {
            if filter.topic0.contains(poisoned) {
                return Err(ChainError::Transport("poisoned selector".into()));
            }
        }
        let logs = self.logs.lock();
        Ok(self
            .matching(filter, &logs)
            .into_iter()
            .filter(|l| l.block_number >= from && l.block_number <= to)
            .collect())
    }
    async fn logs_by_block_hash(
        &self,
        hash: B256,
        filter: &LogFilter,
    ) -> Result<Vec<LogEntry>, ChainError> {
        for poisoned in self.poisoned_selectors.lock().iter() {
            if filter.topic0.contains(poisoned) {
                return Err(ChainError::Transport("poisoned selector".into()));
            }
        }
        let logs = self.logs.lock();
        Ok(self
            .matching(filter, &logs)
            .into_iter()
            .filter(|l| l.block_hash == hash)
            .collect())
    }
    async fn transaction_count(&self, _a: Address, _t: BlockTag) -> Result<u64, ChainError> {
        Ok(0)
    }
    async fn estimate_fees(&self) -> Result<FeeEstimate, ChainError> {
        Ok(FeeEstimate::default())
    }
    async fn send_raw_transaction(&self, _tx: &RawTransaction) -> Result<B256, ChainError> {
        Ok(B256::ZERO)
    }
}

fn config() -> WatcherConfig {
    WatcherConfig {
        block_time_ms: 10,
        max_reorg_depth: 4,
        page_size: 100,
        max_logs_per_query: 1000,
        block_single_query_retry_count: 2,
        fallible_events: vec![],
        backoff_delays_ms: vec![1, 1],
    }
}

async fn collect(
    chain: Arc<ScriptedChain>,
    config: WatcherConfig,
    last_indexed: Option<u64>,
    expect: usize,
) -> Vec<Transition> {
    let watcher = Arc::new(Watcher::new(config, chain, Arc::new(TestCodec)));
    let (tx, mut rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn({
        let watcher = watcher.clone();
        async move {
            let _ = watcher.run(last_indexed, tx, shutdown_rx).await;
        }
    });

    let mut received = Vec::new();
    while received.len() < expect {
        match rx.recv().await {
            Some(transition) => received.push(transition),
            None => break,
        }
    }
    handle.abort();
    received
}

/// Warp emits a tick at each block boundary, events in `(block, log_index)`
/// order, and a final tick at the warp target.
#[tokio::test(start_paused = true)]
async fn warp_orders_ticks_and_events() {
    let chain = Arc::new(ScriptedChain::default());
    *chain.head.lock() = 4;
    *chain.logs.lock() = vec![
        event_log(&attested(3), 3, 0),
        event_log(&attested(1), 1, 0),
        event_log(&attested(2), 1, 1),
    ];

    let received = collect(chain, config(), None, 6).await;
    assert_eq!(
        received
            .iter()
            .map(|t| t.position())
            .collect::<Vec<_>>(),
        vec![(1, 0), (1, 1), (1, 2), (3, 0), (3, 1), (4, 0)]
    );
    assert!(matches!(received[0], Transition::BlockTick { block: 1 }));
    assert!(matches!(
        &received[1],
        Transition::Event { event: ChainEvent::TransactionAttested { .. }, .. }
    ));
    assert!(matches!(received[5], Transition::BlockTick { block: 4 }));
}

/// A failing wide range is halved down and finally split per event; all
/// events still arrive.
#[tokio::test(start_paused = true)]
async fn warp_splits_failing_pages() {
    let chain = Arc::new(ScriptedChain::default());
    *chain.head.lock() = 2;
    *chain.fail_ranges_wider_than.lock() = Some(0);
    *chain.logs.lock() = vec![
        event_log(&attested(1), 1, 0),
        event_log(&attested(2), 2, 0),
    ];

    let received = collect(chain, config(), None, 4).await;
    assert_eq!(
        received.iter().map(|t| t.position()).collect::<Vec<_>>(),
        vec![(1, 0), (1, 1), (2, 0), (2, 1)]
    );
    let events: Vec<_> = received
        .iter()
        .filter(|t| matches!(t, Transition::Event { .. }))
        .collect();
    assert_eq!(events.len(), 2);
}

/// A poisoned per-event query propagates unless the kind is fallible, in
/// which case the event is dropped and everything else flows.
#[tokio::test(start_paused = true)]
async fn fallible_events_are_dropped_not_fatal() {
    let poisoned_kind = EventKind::TransactionAttested;

    let chain = Arc::new(ScriptedChain::default());
    *chain.head.lock() = 1;
    *chain.fail_ranges_wider_than.lock() = Some(0);
    *chain.poisoned_selectors.lock() = vec![TestCodec::selector_for(poisoned_kind)];
    *chain.logs.lock() = vec![
        event_log(&attested(1), 1, 0),
        event_log(
            &ChainEvent::EpochStaged { active_epoch: 1, proposed_epoch: 2, rollover_block: 80 },
            1,
            1,
        ),
    ];

    let mut fallible_config = config();
    fallible_config.fallible_events = vec![poisoned_kind];

    // Tick 1, the EpochStaged event, final tick handling: the poisoned kind
    // is silently dropped.
    let received = collect(chain, fallible_config, None, 2).await;
    assert!(matches!(received[0], Transition::BlockTick { block: 1 }));
    assert!(matches!(
        &received[1],
        Transition::Event { event: ChainEvent::EpochStaged { .. }, .. }
    ));
}

/// Bloom misses skip the log query entirely: quiet blocks produce only
/// their tick.
#[tokio::test(start_paused = true)]
async fn follow_emits_tick_only_on_bloom_miss() {
    let chain = Arc::new(ScriptedChain::default());
    *chain.head.lock() = 0;

    // The cursor sits at the head, so the watcher goes straight to follow
    // mode; the two new blocks arrive while it is polling.
    let received_handle = tokio::spawn(collect(chain.clone(), config(), Some(0), 3));
    tokio::task::yield_now().await;

    chain.blocks.lock().insert(1, block_ref(1, false));
    chain.blocks.lock().insert(2, block_ref(2, true));
    *chain.logs.lock() = vec![event_log(&attested(9), 2, 0)];
    *chain.head.lock() = 2;

    let received = received_handle.await.unwrap();
    assert_eq!(
        received.iter().map(|t| t.position()).collect::<Vec<_>>(),
        vec![(1, 0), (2, 0), (2, 1)]
    );
    assert!(matches!(received[0], Transition::BlockTick { block: 1 }));
    assert!(matches!(received[1], Transition::BlockTick { block: 2 }));
    assert!(matches!(received[2], Transition::Event { block: 2, .. }));
}

/// A fork deeper than the window is fatal.
#[tokio::test(start_paused = true)]
async fn reorg_beyond_window_is_fatal() {
    let chain = Arc::new(ScriptedChain::default());
    *chain.head.lock() = 2;
    chain.blocks.lock().insert(1, block_ref(1, false));
    chain.blocks.lock().insert(2, block_ref(2, false));

    let mut narrow = config();
    narrow.max_reorg_depth = 2;

    let watcher = Arc::new(Watcher::new(
        narrow,
        chain.clone(),
        Arc::new(TestCodec),
    ));
    let (tx, mut rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let watcher = watcher.clone();
        async move { watcher.run(Some(0), tx, shutdown_rx).await }
    });

    // Blocks 1 and 2 flow normally.
    assert!(matches!(rx.recv().await, Some(Transition::BlockTick { block: 1 })));
    assert!(matches!(rx.recv().await, Some(Transition::BlockTick { block: 2 })));

    // The chain is rewritten under the watcher: every known hash changes and
    // block 3 extends the new branch.
    {
        let mut blocks = chain.blocks.lock();
        for number in 1..=2 {
            let rewritten = BlockRef {
                number,
                hash: B256::repeat_byte(0xd0 + number as u8),
                parent_hash: B256::repeat_byte(0xd0 + number as u8 - 1),
                logs_bloom: Bloom::default(),
            };
            blocks.insert(number, rewritten);
        }
        blocks.insert(
            3,
            BlockRef {
                number: 3,
                hash: B256::repeat_byte(0xd3),
                parent_hash: B256::repeat_byte(0xd2),
                logs_bloom: Bloom::default(),
            },
        );
    }
    *chain.head.lock() = 3;

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(WatcherError::ReorgBeyondWindow { max_depth: 2 })));
}

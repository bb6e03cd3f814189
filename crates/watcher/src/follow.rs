// Path: crates/watcher/src/follow.rs

//! Follow mode: one poll per block, bloom pruning, by-hash log queries, and
//! a bounded reorg window.

use crate::{backoff, Watcher, WatcherError};
use alloy_primitives::BloomInput;
use sigil_api::chain::{ChainRpc, LogCodec, LogFilter};
use sigil_types::chain::{BlockRef, LogEntry};
use sigil_types::event::{EventKind, Transition};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

impl<R, C> Watcher<R, C>
where
    R: ChainRpc,
    C: LogCodec,
{
    pub(crate) async fn follow(
        &self,
        start: u64,
        sink: &mpsc::Sender<Transition>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WatcherError> {
        // Ring of recently accepted `(number, hash)` pairs, newest last.
        let mut known: VecDeque<(u64, alloy_primitives::B256)> = VecDeque::new();
        let mut next = start;

        loop {
            let head =
                backoff::retry(&self.config.backoff_delays_ms, || self.rpc.block_number()).await?;

            while next <= head {
                if *shutdown.borrow() {
                    return Ok(());
                }
                match self.process_block(next, &mut known, sink).await? {
                    BlockOutcome::Accepted => next += 1,
                    BlockOutcome::NotYetAvailable => break,
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.config.block_time_ms)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn process_block(
        &self,
        number: u64,
        known: &mut VecDeque<(u64, alloy_primitives::B256)>,
        sink: &mpsc::Sender<Transition>,
    ) -> Result<BlockOutcome, WatcherError> {
        let block = backoff::retry(&self.config.backoff_delays_ms, || {
            self.rpc.block_by_number(number)
        })
        .await?;
        let Some(block) = block else {
            return Ok(BlockOutcome::NotYetAvailable);
        };

        // Reorg detection: the new block must extend the newest known block.
        // An in-window uncle is signalled and skipped over; already delivered
        // transitions stand (the stream is append-only and the machine is
        // idempotent). Deeper forks are fatal.
        if let Some((prev_number, prev_hash)) = known.back().copied() {
            if number == prev_number + 1 && block.parent_hash != prev_hash {
                self.note_uncle(known).await?;
            }
        }

        self.deliver(sink, Transition::BlockTick { block: number }).await?;

        if self.bloom_matches(&block) {
            let logs = self.block_logs(&block).await?;
            let mut logs = logs;
            logs.sort_by_key(|l| l.log_index);
            for log in &logs {
                if let Some(event) = self.decode_log(log)? {
                    self.deliver(
                        sink,
                        Transition::Event { block: number, log_index: log.log_index, event },
                    )
                    .await?;
                }
            }
        } else {
            sigil_telemetry::watcher_metrics().inc_blocks_bloom_skipped();
        }

        known.push_back((number, block.hash));
        while known.len() as u64 > self.config.max_reorg_depth.max(1) {
            known.pop_front();
        }
        Ok(BlockOutcome::Accepted)
    }

    /// Walks the known ring backwards until a block whose hash still matches
    /// the chain and truncates the ring there, so later parent checks align
    /// with the new branch. Running out of ring means the fork is deeper
    /// than the window: fatal.
    async fn note_uncle(
        &self,
        known: &mut VecDeque<(u64, alloy_primitives::B256)>,
    ) -> Result<(), WatcherError> {
        sigil_telemetry::watcher_metrics().inc_reorgs_detected();
        while let Some((number, recorded_hash)) = known.back().copied() {
            let current = backoff::retry(&self.config.backoff_delays_ms, || {
                self.rpc.block_by_number(number)
            })
            .await?;
            if current.as_ref().is_some_and(|b| b.hash == recorded_hash) {
                warn!(target: "watcher", fork_point = number, "uncle detected within reorg window");
                return Ok(());
            }
            known.pop_back();
        }
        Err(WatcherError::ReorgBeyondWindow { max_depth: self.config.max_reorg_depth })
    }

    /// True when the block's bloom may contain one of the watched addresses
    /// or one of the watched event selectors.
    fn bloom_matches(&self, block: &BlockRef) -> bool {
        let addresses = self.codec.watched_addresses();
        let address_hit = addresses
            .iter()
            .any(|a| block.logs_bloom.contains_input(BloomInput::Raw(a.as_slice())));
        let selector_hit = EventKind::ALL.iter().any(|kind| {
            let selector = self.codec.selector(*kind);
            block.logs_bloom.contains_input(BloomInput::Raw(selector.as_slice()))
        });
        address_hit || selector_hit
    }

    /// Queries a block's logs by hash, with the per-event split as the
    /// fallback after the configured retries.
    async fn block_logs(&self, block: &BlockRef) -> Result<Vec<LogEntry>, WatcherError> {
        let filter =
            LogFilter { addresses: self.codec.watched_addresses(), ..Default::default() };
        let attempts = self.config.block_single_query_retry_count;
        match backoff::retry_count(attempts, || self.rpc.logs_by_block_hash(block.hash, &filter))
            .await
        {
            Ok(logs) => Ok(logs),
            Err(failure) => {
                debug!(
                    target: "watcher",
                    block = block.number,
                    %failure,
                    "by-hash query kept failing; splitting per event"
                );
                self.block_logs_per_event(block).await
            }
        }
    }

    /// One by-hash query per event kind, skipping kinds whose selector is
    /// not in the block's bloom. Fallible kinds may be dropped.
    async fn block_logs_per_event(&self, block: &BlockRef) -> Result<Vec<LogEntry>, WatcherError> {
        let mut collected = Vec::new();
        for kind in EventKind::ALL {
            let selector = self.codec.selector(kind);
            if !block
                .logs_bloom
                .contains_input(BloomInput::Raw(selector.as_slice()))
            {
                continue;
            }
            let filter = LogFilter {
                addresses: self.codec.watched_addresses(),
                topic0: vec![selector],
                ..Default::default()
            };
            let attempts = self.config.block_single_query_retry_count;
            match backoff::retry_count(attempts, || {
                self.rpc.logs_by_block_hash(block.hash, &filter)
            })
            .await
            {
                Ok(logs) => collected.extend(logs),
                Err(failure) if self.config.fallible_events.contains(&kind) => {
                    warn!(
                        target: "watcher",
                        kind = kind.name(),
                        block = block.number,
                        %failure,
                        "dropping fallible event query"
                    );
                    sigil_telemetry::watcher_metrics().inc_fallible_events_dropped(kind.name());
                }
                Err(failure) => return Err(failure.into()),
            }
        }
        Ok(collected)
    }
}

enum BlockOutcome {
    Accepted,
    NotYetAvailable,
}

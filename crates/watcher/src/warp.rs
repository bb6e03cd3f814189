// Path: crates/watcher/src/warp.rs

//! Warp mode: catch up from the persisted cursor to the chain head with
//! paged log queries.
//!
//! A failing or overflowing page is halved down to a single block; a single
//! block that still fails is split into one query per event kind, each with
//! its own bounded retry. Only events marked fallible may be dropped at that
//! point; everything else propagates.

use crate::{backoff, Watcher, WatcherError};
use sigil_api::chain::{ChainRpc, LogCodec, LogFilter};
use sigil_types::chain::LogEntry;
use sigil_types::event::Transition;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

impl<R, C> Watcher<R, C>
where
    R: ChainRpc,
    C: LogCodec,
{
    pub(crate) async fn warp(
        &self,
        from: u64,
        head: u64,
        sink: &mpsc::Sender<Transition>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), WatcherError> {
        let mut cursor = from;
        let mut page_size = self.config.page_size.max(1);
        let mut last_tick = from.saturating_sub(1);

        while cursor <= head {
            if *shutdown.borrow() {
                return Ok(());
            }
            let to = cursor.saturating_add(page_size - 1).min(head);

            match self.query_page(cursor, to).await {
                Ok(mut logs) => {
                    logs.sort_by_key(|l| (l.block_number, l.log_index));
                    self.emit_page(&logs, &mut last_tick, sink).await?;
                    cursor = to + 1;
                    page_size = self.config.page_size.max(1);
                }
                Err(failure) => {
                    if page_size > 1 {
                        page_size = (page_size / 2).max(1);
                        debug!(
                            target: "watcher",
                            from = cursor,
                            %failure,
                            page_size,
                            "page query failed; halving range"
                        );
                        continue;
                    }
                    // A single block that still fails: split by event kind.
                    let mut logs = self.query_block_per_event(cursor).await?;
                    logs.sort_by_key(|l| (l.block_number, l.log_index));
                    self.emit_page(&logs, &mut last_tick, sink).await?;
                    cursor += 1;
                    page_size = self.config.page_size.max(1);
                }
            }
        }

        if last_tick < head {
            self.deliver(sink, Transition::BlockTick { block: head }).await?;
        }
        Ok(())
    }

    /// One ranged query over all watched addresses. A result at or above
    /// `max_logs_per_query` is treated as overflow.
    async fn query_page(&self, from: u64, to: u64) -> Result<Vec<LogEntry>, WatcherError> {
        let filter = LogFilter {
            from_block: Some(from),
            to_block: Some(to),
            addresses: self.codec.watched_addresses(),
            topic0: Vec::new(),
        };
        let logs = self.rpc.logs(&filter).await?;
        if logs.len() >= self.config.max_logs_per_query {
            return Err(WatcherError::Rpc(sigil_types::error::ChainError::Transport(
                format!("log query overflow: {} results", logs.len()),
            )));
        }
        Ok(logs)
    }

    /// The last-resort split: one ranged query per event signature, each
    /// retried a configured number of times. Fallible kinds are dropped
    /// with a warning on persistent failure.
    pub(crate) async fn query_block_per_event(
        &self,
        block: u64,
    ) -> Result<Vec<LogEntry>, WatcherError> {
        let mut collected = Vec::new();
        for kind in sigil_types::event::EventKind::ALL {
            let filter = LogFilter {
                from_block: Some(block),
                to_block: Some(block),
                addresses: self.codec.watched_addresses(),
                topic0: vec![self.codec.selector(kind)],
            };
            let attempts = self.config.block_single_query_retry_count;
            match backoff::retry_count(attempts, || self.rpc.logs(&filter)).await {
                Ok(logs) => collected.extend(logs),
                Err(failure) if self.config.fallible_events.contains(&kind) => {
                    warn!(
                        target: "watcher",
                        kind = kind.name(),
                        block,
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

    /// Emits a sorted page: a tick at every block boundary, then the
    /// block's events.
    async fn emit_page(
        &self,
        logs: &[LogEntry],
        last_tick: &mut u64,
        sink: &mpsc::Sender<Transition>,
    ) -> Result<(), WatcherError> {
        for log in logs {
            if log.block_number > *last_tick {
                *last_tick = log.block_number;
                self.deliver(sink, Transition::BlockTick { block: log.block_number }).await?;
            }
            if let Some(event) = self.decode_log(log)? {
                self.deliver(
                    sink,
                    Transition::Event {
                        block: log.block_number,
                        log_index: log.log_index,
                        event,
                    },
                )
                .await?;
            }
        }
        Ok(())
    }
}

// Path: crates/watcher/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # Sigil Watcher
//!
//! The transition source: follows the coordinator/consensus chain and emits
//! the canonical, gap-free, ordered stream of [`Transition`] values the
//! machine consumes.
//!
//! On start the watcher *warps* from the persisted cursor to the chain head
//! with paged log queries, then switches to *follow* mode: one poll per
//! block, bloom-filter pruning, by-hash log queries, and a bounded reorg
//! window. Delivery is at-least-once (the cursor is only advanced by the
//! consumer, atomically with the machine diff) and transitions never
//! regress.
//!
//! [`Transition`]: sigil_types::event::Transition

mod backoff;
mod error;
mod follow;
mod warp;

pub use error::WatcherError;

use sigil_api::chain::{ChainRpc, LogCodec};
use sigil_types::chain::LogEntry;
use sigil_types::config::WatcherConfig;
use sigil_types::event::{ChainEvent, Transition};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// The chain watcher (one per validator).
pub struct Watcher<R, C> {
    config: WatcherConfig,
    rpc: Arc<R>,
    codec: Arc<C>,
}

impl<R, C> Watcher<R, C>
where
    R: ChainRpc,
    C: LogCodec,
{
    /// Builds a watcher over an RPC endpoint and a log codec.
    pub fn new(config: WatcherConfig, rpc: Arc<R>, codec: Arc<C>) -> Self {
        Watcher { config, rpc, codec }
    }

    /// Runs until shutdown or a fatal error: warp from `last_indexed_block`
    /// to the head, then follow. Transitions are pushed into `sink` in
    /// `(block, log_index)` order; the tick of a block precedes its events.
    pub async fn run(
        &self,
        last_indexed_block: Option<u64>,
        sink: mpsc::Sender<Transition>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WatcherError> {
        let start = last_indexed_block.map_or(0, |b| b + 1);
        let head = backoff::retry(&self.config.backoff_delays_ms, || self.rpc.block_number())
            .await?;

        let resume_at = if start <= head {
            info!(target: "watcher", from = start, to = head, "warping to chain head");
            self.warp(start, head, &sink, &mut shutdown).await?;
            head + 1
        } else {
            start
        };

        info!(target: "watcher", from = resume_at, "entering follow mode");
        self.follow(resume_at, &sink, &mut shutdown).await
    }

    /// Decodes one raw log. `Ok(None)` means the log is not ours or was
    /// dropped as fallible; hard decode failures propagate.
    fn decode_log(&self, log: &LogEntry) -> Result<Option<ChainEvent>, WatcherError> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let Some(kind) = self.codec.kind_of(topic0) else {
            return Ok(None);
        };
        match self.codec.decode(log) {
            Ok(decoded) => Ok(decoded),
            Err(failure) if self.config.fallible_events.contains(&kind) => {
                warn!(
                    target: "watcher",
                    kind = kind.name(),
                    block = log.block_number,
                    log_index = log.log_index,
                    %failure,
                    "dropping fallible event"
                );
                sigil_telemetry::watcher_metrics().inc_fallible_events_dropped(kind.name());
                Ok(None)
            }
            Err(failure) => Err(WatcherError::Decode {
                kind: kind.name(),
                reason: failure.to_string(),
            }),
        }
    }

    /// Pushes one transition, keeping per-kind delivery metrics.
    async fn deliver(
        &self,
        sink: &mpsc::Sender<Transition>,
        transition: Transition,
    ) -> Result<(), WatcherError> {
        if let Transition::Event { event, .. } = &transition {
            sigil_telemetry::watcher_metrics().inc_events_delivered(event.kind().name());
        }
        sink.send(transition).await.map_err(|_| WatcherError::ChannelClosed)
    }
}

// Path: crates/watcher/src/error.rs

//! Error types for the chain watcher.

use sigil_types::error::{ChainError, ErrorCode};
use thiserror::Error;

/// Failures of the transition source.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// The chain endpoint kept failing after the full backoff ladder.
    #[error(transparent)]
    Rpc(#[from] ChainError),
    /// A non-fallible event failed to decode.
    #[error("decode failed for {kind}: {reason}")]
    Decode {
        /// The event kind that failed.
        kind: &'static str,
        /// Why decoding failed.
        reason: String,
    },
    /// A reorg deeper than the configured window; operator intervention.
    #[error("reorg beyond window: fork depth exceeds {max_depth}")]
    ReorgBeyondWindow {
        /// The configured window.
        max_depth: u64,
    },
    /// The consumer dropped its end of the transition queue (shutdown).
    #[error("transition sink closed")]
    ChannelClosed,
}

impl ErrorCode for WatcherError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rpc(e) => e.code(),
            Self::Decode { .. } => "WATCHER_DECODE",
            Self::ReorgBeyondWindow { .. } => "WATCHER_REORG_BEYOND_WINDOW",
            Self::ChannelClosed => "WATCHER_CHANNEL_CLOSED",
        }
    }
}

// Path: crates/watcher/src/backoff.rs

//! Bounded retry with a configured backoff ladder.
//!
//! Transient endpoint failures (timeouts, 5xx, EIP-1474 limit-exceeded) are
//! retried over the ladder; the ladder resets on success. Exhausting it
//! propagates the last error.

use sigil_types::error::ChainError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

fn is_transient(error: &ChainError) -> bool {
    matches!(error, ChainError::RateLimited | ChainError::Transport(_))
}

/// Runs `operation`, retrying transient failures over `delays_ms`.
pub async fn retry<T, F, Fut>(delays_ms: &[u64], mut operation: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut ladder = delays_ms.iter();
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if is_transient(&error) => match ladder.next() {
                Some(delay_ms) => {
                    warn!(target: "watcher", %error, delay_ms, "transient RPC failure; backing off");
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                None => return Err(error),
            },
            Err(error) => return Err(error),
        }
    }
}

/// Runs `operation` up to `attempts` times with no delay between tries,
/// returning the last error. Used for the per-event fallback queries where
/// the backoff already happened a level up.
pub async fn retry_count<T, F, Fut>(attempts: u32, mut operation: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut last = None;
    for _ in 0..attempts.max(1) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => last = Some(error),
        }
    }
    Err(last.unwrap_or(ChainError::Transport("no attempts made".into())))
}

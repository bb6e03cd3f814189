// Path: crates/submitter/src/fees.rs

//! The per-block fee estimator.
//!
//! One estimate per block: repeated calls inside a tick reuse the cached
//! result, concurrent callers share the in-flight request, and a failed
//! estimate is cached as the failure for that block. Seeing a higher block
//! invalidates the cache.

use futures::future::{BoxFuture, FutureExt, Shared};
use sigil_api::chain::ChainRpc;
use sigil_types::chain::FeeEstimate;
use sigil_types::error::ChainError;
use std::sync::Arc;
use tokio::sync::Mutex;

type SharedEstimate = Shared<BoxFuture<'static, Result<FeeEstimate, String>>>;

/// A memoising wrapper over `eth_feeHistory`-style estimation.
pub struct FeeEstimator<R> {
    rpc: Arc<R>,
    cache: Mutex<Option<(u64, SharedEstimate)>>,
}

impl<R> FeeEstimator<R>
where
    R: ChainRpc + 'static,
{
    /// Builds an estimator over the endpoint.
    pub fn new(rpc: Arc<R>) -> Self {
        FeeEstimator { rpc, cache: Mutex::new(None) }
    }

    /// The fee estimate for `block`. The first caller per block issues the
    /// RPC; everyone else awaits the same future or reads the cached result
    /// (including a cached failure).
    pub async fn estimate(&self, block: u64) -> Result<FeeEstimate, ChainError> {
        let shared = {
            let mut cache = self.cache.lock().await;
            match cache.as_ref() {
                Some((cached_block, shared)) if *cached_block == block => shared.clone(),
                _ => {
                    let rpc = self.rpc.clone();
                    let shared = async move {
                        rpc.estimate_fees().await.map_err(|e| e.to_string())
                    }
                    .boxed()
                    .shared();
                    *cache = Some((block, shared.clone()));
                    shared
                }
            }
        };
        shared.await.map_err(ChainError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use async_trait::async_trait;
    use sigil_api::chain::{BlockTag, LogFilter};
    use sigil_types::chain::{BlockRef, LogEntry, RawTransaction};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingRpc {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ChainRpc for CountingRpc {
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
        async fn transaction_count(
            &self,
            _a: Address,
            _t: BlockTag,
        ) -> Result<u64, ChainError> {
            Ok(0)
        }
        async fn estimate_fees(&self) -> Result<FeeEstimate, ChainError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ChainError::Transport("estimation down".into()));
            }
            Ok(FeeEstimate {
                max_fee_per_gas: 100 + u128::from(n),
                max_priority_fee_per_gas: 10,
            })
        }
        async fn send_raw_transaction(&self, _tx: &RawTransaction) -> Result<B256, ChainError> {
            Ok(B256::ZERO)
        }
    }

    #[tokio::test]
    async fn same_block_reuses_estimate() {
        let rpc = Arc::new(CountingRpc::default());
        let estimator = FeeEstimator::new(rpc.clone());

        let first = estimator.estimate(7).await.unwrap();
        let second = estimator.estimate(7).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn higher_block_invalidates() {
        let rpc = Arc::new(CountingRpc::default());
        let estimator = FeeEstimator::new(rpc.clone());

        let first = estimator.estimate(7).await.unwrap();
        let second = estimator.estimate(8).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_cached_per_block() {
        let rpc = Arc::new(CountingRpc { fail: true, ..Default::default() });
        let estimator = FeeEstimator::new(rpc.clone());

        assert!(estimator.estimate(7).await.is_err());
        assert!(estimator.estimate(7).await.is_err());
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }
}

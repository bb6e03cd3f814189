// Path: crates/submitter/src/outbox.rs

//! The durable outbox and its pump loop.

use crate::error::SubmitterError;
use crate::fees::FeeEstimator;
use sigil_api::chain::{ActionEncoder, BlockTag, ChainRpc};
use sigil_api::storage::{OutboxStore, SubmissionEntry, SubmissionStatus};
use sigil_crypto::hash::action_id;
use sigil_types::action::Action;
use sigil_types::chain::FeeEstimate;
use sigil_types::config::SubmitterConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The transaction submitter (one per signing identity).
pub struct Submitter<S, R, E> {
    config: SubmitterConfig,
    storage: Arc<S>,
    rpc: Arc<R>,
    encoder: Arc<E>,
    fees: FeeEstimator<R>,
    // One enqueue or pump at a time; nonce allocation must never interleave.
    serial: Mutex<()>,
}

impl<S, R, E> Submitter<S, R, E>
where
    S: OutboxStore,
    R: ChainRpc + 'static,
    E: ActionEncoder,
{
    /// Builds a submitter over its storage, endpoint, and encoder.
    pub fn new(config: SubmitterConfig, storage: Arc<S>, rpc: Arc<R>, encoder: Arc<E>) -> Self {
        let fees = FeeEstimator::new(rpc.clone());
        Submitter { config, storage, rpc, encoder, fees, serial: Mutex::new(()) }
    }

    /// Records an action in the outbox at the account's next pending nonce.
    /// The entry is sent by the next pump.
    pub async fn enqueue(&self, action: Action) -> Result<u64, SubmitterError> {
        let _guard = self.serial.lock().await;

        let nonce = self
            .rpc
            .transaction_count(self.encoder.sender(), BlockTag::Pending)
            .await?;
        let raw_tx = self.encoder.encode(&action, nonce, FeeEstimate::default()).await?;
        let entry = SubmissionEntry {
            nonce,
            action_id: action_id(&action)?,
            action,
            raw_tx,
            last_fees: None,
            last_hash: None,
            status: SubmissionStatus::Pending,
        };
        self.storage.append(&entry).await?;
        sigil_telemetry::submitter_metrics().inc_enqueued();
        debug!(target: "submitter", nonce, action = entry.action.name(), "action enqueued");
        Ok(nonce)
    }

    /// One pump tick: reconcile against the confirmed nonce, then walk the
    /// unexecuted entries in nonce order, re-signing each with bumped fees.
    /// A send failure stops the tick; the next tick retries the same entry.
    pub async fn pump(&self, block: u64) -> Result<(), SubmitterError> {
        let _guard = self.serial.lock().await;

        let confirmed = self
            .rpc
            .transaction_count(self.encoder.sender(), BlockTag::Latest)
            .await?;
        let reconciled = self.storage.mark_executed_below(confirmed).await?;
        if reconciled > 0 {
            sigil_telemetry::submitter_metrics().inc_reconciled();
            debug!(target: "submitter", confirmed, reconciled, "entries confirmed on chain");
        }

        let entries = self.storage.unexecuted().await?;
        sigil_telemetry::submitter_metrics().set_outbox_depth(entries.len() as u64);

        for entry in entries {
            if entry.nonce < confirmed {
                continue;
            }
            let estimate = self.fees.estimate(block).await?;
            let target = entry
                .last_fees
                .unwrap_or_default()
                .max(estimate)
                .bump(self.config.fee_bump_numerator, self.config.fee_bump_denominator);

            let raw_tx = self.encoder.encode(&entry.action, entry.nonce, target).await?;
            match self.rpc.send_raw_transaction(&raw_tx).await {
                Ok(hash) => {
                    self.storage
                        .record_submission(entry.nonce, &raw_tx, hash, target)
                        .await?;
                    sigil_telemetry::submitter_metrics().inc_submitted();
                    info!(
                        target: "submitter",
                        nonce = entry.nonce,
                        action = entry.action.name(),
                        hash = %hash,
                        "transaction sent"
                    );
                }
                Err(rejection) if rejection.is_nonce_too_low() => {
                    // Confirmed between our nonce query and the send (or a
                    // previous send landed); the hash on record stands.
                    self.storage.mark_executed(entry.nonce).await?;
                    sigil_telemetry::submitter_metrics().inc_reconciled();
                    debug!(target: "submitter", nonce = entry.nonce, "nonce consumed; entry executed");
                }
                Err(failure) => {
                    warn!(
                        target: "submitter",
                        nonce = entry.nonce,
                        %failure,
                        "send failed; stopping tick"
                    );
                    sigil_telemetry::submitter_metrics().inc_stopped_ticks();
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metric sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

// --- Metric Statics ---
// We use OnceCell to hold the metric collectors. They will be initialized
// exactly once by the `install` function.

static WATCHER_LAST_INDEXED_BLOCK: OnceCell<IntGauge> = OnceCell::new();
static WATCHER_EVENTS_DELIVERED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static WATCHER_BLOCKS_BLOOM_SKIPPED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WATCHER_FALLIBLE_EVENTS_DROPPED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static WATCHER_REORGS_DETECTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static MACHINE_TRANSITIONS_APPLIED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static MACHINE_ACTIONS_EMITTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MACHINE_VERIFICATION_FAILURES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static MACHINE_TIMEOUTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SUBMITTER_ENQUEUED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SUBMITTER_SUBMITTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SUBMITTER_RECONCILED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SUBMITTER_STOPPED_TICKS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SUBMITTER_OUTBOX_DEPTH: OnceCell<IntGauge> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// The Prometheus-backed metrics sink.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

#[allow(clippy::expect_used)]
impl WatcherMetricsSink for PrometheusSink {
    fn set_last_indexed_block(&self, block: u64) {
        get_metric!(WATCHER_LAST_INDEXED_BLOCK).set(block as i64);
    }
    fn inc_events_delivered(&self, kind: &str) {
        get_metric!(WATCHER_EVENTS_DELIVERED_TOTAL)
            .with_label_values(&[kind])
            .inc();
    }
    fn inc_blocks_bloom_skipped(&self) {
        get_metric!(WATCHER_BLOCKS_BLOOM_SKIPPED_TOTAL).inc();
    }
    fn inc_fallible_events_dropped(&self, kind: &str) {
        get_metric!(WATCHER_FALLIBLE_EVENTS_DROPPED_TOTAL)
            .with_label_values(&[kind])
            .inc();
    }
    fn inc_reorgs_detected(&self) {
        get_metric!(WATCHER_REORGS_DETECTED_TOTAL).inc();
    }
}

#[allow(clippy::expect_used)]
impl MachineMetricsSink for PrometheusSink {
    fn inc_transitions_applied(&self) {
        get_metric!(MACHINE_TRANSITIONS_APPLIED_TOTAL).inc();
    }
    fn inc_actions_emitted(&self, action: &str) {
        get_metric!(MACHINE_ACTIONS_EMITTED_TOTAL)
            .with_label_values(&[action])
            .inc();
    }
    fn inc_verification_failures(&self) {
        get_metric!(MACHINE_VERIFICATION_FAILURES_TOTAL).inc();
    }
    fn inc_timeouts(&self, phase: &str) {
        get_metric!(MACHINE_TIMEOUTS_TOTAL)
            .with_label_values(&[phase])
            .inc();
    }
}

#[allow(clippy::expect_used)]
impl SubmitterMetricsSink for PrometheusSink {
    fn inc_enqueued(&self) {
        get_metric!(SUBMITTER_ENQUEUED_TOTAL).inc();
    }
    fn inc_submitted(&self) {
        get_metric!(SUBMITTER_SUBMITTED_TOTAL).inc();
    }
    fn inc_reconciled(&self) {
        get_metric!(SUBMITTER_RECONCILED_TOTAL).inc();
    }
    fn inc_stopped_ticks(&self) {
        get_metric!(SUBMITTER_STOPPED_TICKS_TOTAL).inc();
    }
    fn set_outbox_depth(&self, depth: u64) {
        get_metric!(SUBMITTER_OUTBOX_DEPTH).set(depth as i64);
    }
}

#[allow(clippy::expect_used)]
impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, component: &'static str, code: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[component, code])
            .inc();
    }
}

/// Initializes all Prometheus metric collectors and returns a static
/// reference to the sink. This function must be called only once at
/// application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    WATCHER_LAST_INDEXED_BLOCK
        .set(register_int_gauge!(
            "sigil_watcher_last_indexed_block",
            "Last chain block whose transitions are fully applied."
        )?)
        .expect("static already initialized");
    WATCHER_EVENTS_DELIVERED_TOTAL
        .set(register_int_counter_vec!(
            "sigil_watcher_events_delivered_total",
            "Total decoded events delivered to the machine.",
            &["kind"]
        )?)
        .expect("static already initialized");
    WATCHER_BLOCKS_BLOOM_SKIPPED_TOTAL
        .set(register_int_counter!(
            "sigil_watcher_blocks_bloom_skipped_total",
            "Total blocks skipped without a log query on a bloom miss."
        )?)
        .expect("static already initialized");
    WATCHER_FALLIBLE_EVENTS_DROPPED_TOTAL
        .set(register_int_counter_vec!(
            "sigil_watcher_fallible_events_dropped_total",
            "Total fallible events dropped after repeated failures.",
            &["kind"]
        )?)
        .expect("static already initialized");
    WATCHER_REORGS_DETECTED_TOTAL
        .set(register_int_counter!(
            "sigil_watcher_reorgs_detected_total",
            "Total in-window reorgs detected and replayed."
        )?)
        .expect("static already initialized");
    MACHINE_TRANSITIONS_APPLIED_TOTAL
        .set(register_int_counter!(
            "sigil_machine_transitions_applied_total",
            "Total transitions applied by the state machine."
        )?)
        .expect("static already initialized");
    MACHINE_ACTIONS_EMITTED_TOTAL
        .set(register_int_counter_vec!(
            "sigil_machine_actions_emitted_total",
            "Total actions emitted by the state machine.",
            &["action"]
        )?)
        .expect("static already initialized");
    MACHINE_VERIFICATION_FAILURES_TOTAL
        .set(register_int_counter!(
            "sigil_machine_verification_failures_total",
            "Total packets dropped by the verification engine."
        )?)
        .expect("static already initialized");
    MACHINE_TIMEOUTS_TOTAL
        .set(register_int_counter_vec!(
            "sigil_machine_timeouts_total",
            "Total protocol timeouts fired, by phase.",
            &["phase"]
        )?)
        .expect("static already initialized");
    SUBMITTER_ENQUEUED_TOTAL
        .set(register_int_counter!(
            "sigil_submitter_enqueued_total",
            "Total actions enqueued into the outbox."
        )?)
        .expect("static already initialized");
    SUBMITTER_SUBMITTED_TOTAL
        .set(register_int_counter!(
            "sigil_submitter_submitted_total",
            "Total successful transaction sends."
        )?)
        .expect("static already initialized");
    SUBMITTER_RECONCILED_TOTAL
        .set(register_int_counter!(
            "sigil_submitter_reconciled_total",
            "Total outbox entries reconciled against the confirmed nonce."
        )?)
        .expect("static already initialized");
    SUBMITTER_STOPPED_TICKS_TOTAL
        .set(register_int_counter!(
            "sigil_submitter_stopped_ticks_total",
            "Total submitter ticks stopped early by a send failure."
        )?)
        .expect("static already initialized");
    SUBMITTER_OUTBOX_DEPTH
        .set(register_int_gauge!(
            "sigil_submitter_outbox_depth",
            "Outbox entries that are pending or submitted."
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "sigil_errors_total",
            "Total errors by component and stable error code.",
            &["component", "code"]
        )?)
        .expect("static already initialized");

    Ok(&PrometheusSink)
}

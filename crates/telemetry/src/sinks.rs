// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured watcher metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn watcher_metrics() -> &'static dyn WatcherMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured machine metrics sink.
pub fn machine_metrics() -> &'static dyn MachineMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured submitter metrics sink.
pub fn submitter_metrics() -> &'static dyn SubmitterMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured error metrics sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the chain watcher.
pub trait WatcherMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the last fully indexed block.
    fn set_last_indexed_block(&self, block: u64);
    /// Increments the counter for decoded and delivered events.
    fn inc_events_delivered(&self, kind: &str);
    /// Increments the counter for blocks skipped on a bloom miss.
    fn inc_blocks_bloom_skipped(&self);
    /// Increments the counter for fallible events dropped after failures.
    fn inc_fallible_events_dropped(&self, kind: &str);
    /// Increments the counter for detected in-window reorgs.
    fn inc_reorgs_detected(&self);
}
impl WatcherMetricsSink for NopSink {
    fn set_last_indexed_block(&self, _block: u64) {}
    fn inc_events_delivered(&self, _kind: &str) {}
    fn inc_blocks_bloom_skipped(&self) {}
    fn inc_fallible_events_dropped(&self, _kind: &str) {}
    fn inc_reorgs_detected(&self) {}
}

/// A sink for metrics related to the protocol state machine.
pub trait MachineMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for applied transitions.
    fn inc_transitions_applied(&self);
    /// Increments the counter for emitted actions, labeled by action name.
    fn inc_actions_emitted(&self, action: &str);
    /// Increments the counter for packets that failed verification.
    fn inc_verification_failures(&self);
    /// Increments the counter for fired protocol timeouts, labeled by phase.
    fn inc_timeouts(&self, phase: &str);
}
impl MachineMetricsSink for NopSink {
    fn inc_transitions_applied(&self) {}
    fn inc_actions_emitted(&self, _action: &str) {}
    fn inc_verification_failures(&self) {}
    fn inc_timeouts(&self, _phase: &str) {}
}

/// A sink for metrics related to the transaction submitter.
pub trait SubmitterMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for enqueued actions.
    fn inc_enqueued(&self);
    /// Increments the counter for successful sends.
    fn inc_submitted(&self);
    /// Increments the counter for entries reconciled as already executed.
    fn inc_reconciled(&self);
    /// Increments the counter for ticks stopped early by a send failure.
    fn inc_stopped_ticks(&self);
    /// Sets the gauge for outbox entries that are pending or submitted.
    fn set_outbox_depth(&self, depth: u64);
}
impl SubmitterMetricsSink for NopSink {
    fn inc_enqueued(&self) {}
    fn inc_submitted(&self) {}
    fn inc_reconciled(&self) {}
    fn inc_stopped_ticks(&self) {}
    fn set_outbox_depth(&self, _depth: u64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its stable code.
    fn inc_error(&self, component: &'static str, code: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _component: &'static str, _code: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a
/// single point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    WatcherMetricsSink + MachineMetricsSink + SubmitterMetricsSink + ErrorMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: WatcherMetricsSink + MachineMetricsSink + SubmitterMetricsSink + ErrorMetricsSink
{
}

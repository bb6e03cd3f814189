// Path: crates/telemetry/src/lib.rs
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

//! # Sigil Telemetry
//!
//! Observability infrastructure for the Sigil validator: structured logging
//! initialization, abstract metric sinks for decoupling instrumentation from
//! the backend, and the concrete Prometheus implementation.

/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of metric sinks using the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics reporting.
pub mod sinks;

// Re-export the public helper functions for easy access to the global sinks.
pub use sinks::{error_metrics, machine_metrics, submitter_metrics, watcher_metrics};

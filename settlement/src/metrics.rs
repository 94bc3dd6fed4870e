//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the settlement scheduler.
//!
//! # Metrics
//!
//! - `settlement_ticks_total` - Total number of scheduler ticks
//! - `settlement_settled_total` - Payments settled as DONE
//! - `settlement_failed_total` - Payments settled as FAILED
//! - `settlement_skipped_total` - Due payments skipped (already terminal)
//! - `settlement_errors_total` - Per-payment errors that left a payment pending
//! - `settlement_tick_duration_seconds` - Histogram of tick latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total scheduler ticks
    pub ticks_total: IntCounter,

    /// Payments transitioned to DONE
    pub settled_total: IntCounter,

    /// Payments transitioned to FAILED
    pub failed_total: IntCounter,

    /// Due payments found already terminal
    pub skipped_total: IntCounter,

    /// Per-payment errors (payment left pending for a later tick)
    pub errors_total: IntCounter,

    /// Tick duration histogram
    pub tick_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ticks_total = IntCounter::new(
            "settlement_ticks_total",
            "Total number of scheduler ticks",
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let settled_total = IntCounter::new(
            "settlement_settled_total",
            "Payments settled as DONE",
        )?;
        registry.register(Box::new(settled_total.clone()))?;

        let failed_total = IntCounter::new(
            "settlement_failed_total",
            "Payments settled as FAILED",
        )?;
        registry.register(Box::new(failed_total.clone()))?;

        let skipped_total = IntCounter::new(
            "settlement_skipped_total",
            "Due payments skipped because they were already terminal",
        )?;
        registry.register(Box::new(skipped_total.clone()))?;

        let errors_total = IntCounter::new(
            "settlement_errors_total",
            "Per-payment errors that left a payment pending",
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_tick_duration_seconds",
                "Histogram of tick latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        Ok(Self {
            ticks_total,
            settled_total,
            failed_total,
            skipped_total,
            errors_total,
            tick_duration,
            registry,
        })
    }

    /// Gather current metrics in Prometheus text format
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

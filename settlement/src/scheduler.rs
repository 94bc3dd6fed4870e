//! Periodic settlement scheduler
//!
//! Polls the due-payment index on a fixed interval (default: every 60
//! seconds) and settles every PENDING payment whose due instant has passed.
//! Payments are processed oldest-due-first and independently: one payment's
//! failure or error never stops the rest of the tick.

use crate::{Metrics, Result, ScheduledPayments};
use bank_core::PaymentStatus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome counters for one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Payments found due at the start of the tick
    pub due: usize,

    /// Payments transitioned to DONE
    pub settled: usize,

    /// Payments transitioned to FAILED
    pub failed: usize,

    /// Payments already terminal by the time they were processed
    pub skipped: usize,

    /// Payments left PENDING because settlement errored
    pub errors: usize,
}

/// Periodic settlement scheduler
pub struct SettlementScheduler {
    /// Scheduled payment service
    payments: Arc<ScheduledPayments>,

    /// Poll interval between ticks
    poll_interval: std::time::Duration,

    /// Metrics collector
    metrics: Metrics,
}

impl std::fmt::Debug for SettlementScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementScheduler")
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl SettlementScheduler {
    /// Create a scheduler over a payment service
    pub fn new(
        payments: Arc<ScheduledPayments>,
        poll_interval: std::time::Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            payments,
            poll_interval,
            metrics,
        }
    }

    /// Metrics collector for this scheduler
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start the scheduler loop
    pub async fn start(self: Arc<Self>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting settlement scheduler"
        );

        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            match self.run_once(Utc::now()) {
                Ok(stats) if stats.due > 0 => {
                    info!(
                        due = stats.due,
                        settled = stats.settled,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        errors = stats.errors,
                        "Settlement tick complete"
                    );
                }
                Ok(_) => debug!("Settlement tick complete, nothing due"),
                Err(e) => warn!("Settlement tick failed: {}", e),
            }
        }
    }

    /// Run a single settlement pass over everything due at `as_of`
    pub fn run_once(&self, as_of: DateTime<Utc>) -> Result<TickStats> {
        let timer = self.metrics.tick_duration.start_timer();
        self.metrics.ticks_total.inc();

        let due = self.payments.due_pending(as_of)?;
        let mut stats = TickStats {
            due: due.len(),
            ..TickStats::default()
        };

        for payment_id in due {
            match self.payments.settle(payment_id) {
                Ok(payment) => match payment.status {
                    PaymentStatus::Done => {
                        stats.settled += 1;
                        self.metrics.settled_total.inc();
                    }
                    PaymentStatus::Failed => {
                        stats.failed += 1;
                        self.metrics.failed_total.inc();
                    }
                    // settle only returns terminal states
                    _ => unreachable!("settle returned non-terminal status"),
                },
                Err(crate::Error::Ledger(bank_core::Error::AlreadyTerminal { .. })) => {
                    // Raced with a cancel or another settler between the
                    // index scan and the row lock
                    stats.skipped += 1;
                    self.metrics.skipped_total.inc();
                }
                Err(e) => {
                    // Payment stays PENDING and is retried next tick
                    stats.errors += 1;
                    self.metrics.errors_total.inc();
                    warn!(payment_id = %payment_id, "Settlement error: {}", e);
                }
            }
        }

        timer.observe_duration();
        Ok(stats)
    }
}

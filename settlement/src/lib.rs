//! Scheduled Payment Settlement
//!
//! Implements the deferred-payment lifecycle on top of the bank ledger:
//!
//! 1. **Schedule**: reserve funds on the paying account, record a PENDING
//!    payment for a future instant
//! 2. **Settle**: at or after the due instant, convert the payment into a
//!    real transfer (DONE) or mark it FAILED if the balance no longer covers
//!    it; either way the reservation is released exactly once
//! 3. **Cancel**: release the reservation without moving money
//!
//! Scheduled payments are never physically deleted: single deletes redirect
//! to cancellation, bulk deletes are refused outright.
//!
//! The [`SettlementScheduler`] is the autonomous part: a fixed-period loop
//! that settles every due PENDING payment, isolating failures per item.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{Metrics, ScheduledPayments, SettlementScheduler};
//! use bank_core::{AccountNo, Ledger};
//! use chrono::Utc;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! fn main() -> settlement::Result<()> {
//!     let ledger = Arc::new(Ledger::open(bank_core::Config::default())?);
//!     let payments = Arc::new(ScheduledPayments::new(ledger));
//!
//!     let payment = payments.schedule(
//!         AccountNo::new(1),
//!         AccountNo::new(2),
//!         Decimal::from(100),
//!         Utc::now() + chrono::Duration::days(1),
//!     )?;
//!     println!("scheduled {}", payment.payment_id);
//!
//!     let scheduler = Arc::new(SettlementScheduler::new(
//!         payments,
//!         std::time::Duration::from_secs(60),
//!         Metrics::new()?,
//!     ));
//!     let stats = scheduler.run_once(Utc::now())?;
//!     println!("settled {} of {} due", stats.settled, stats.due);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::ScheduledPayments;
pub use metrics::Metrics;
pub use scheduler::{SettlementScheduler, TickStats};

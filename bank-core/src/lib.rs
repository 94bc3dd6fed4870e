//! Nanobank Ledger Core
//!
//! Strict-consistency account ledger with soft holds for scheduled payments.
//!
//! # Architecture
//!
//! - **Account rows**: `balance` plus `reserved_amount` (funds soft-held for
//!   pending scheduled payments); spendable = balance - reserved
//! - **Row locks**: every account row touched by a unit of work is locked in
//!   ascending account-number order before it is read
//! - **Atomic commits**: all mutations of a unit of work land in one RocksDB
//!   write batch together with the business record that caused them
//!
//! # Invariants
//!
//! - Money conservation: a transfer moves balance, it never creates it
//! - `reserved_amount` == Σ amounts of the account's PENDING scheduled payments
//! - Transfers are immutable once recorded; accounts are never deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod txn;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use txn::UnitOfWork;
pub use types::{Account, AccountNo, PaymentStatus, ScheduledPayment, Transfer};

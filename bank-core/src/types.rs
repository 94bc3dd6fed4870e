//! Core types for the bank ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Memory safety (no unsafe code)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account number (unique within the bank)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountNo(u64);

impl AccountNo {
    /// Create new account number
    pub fn new(no: u64) -> Self {
        Self(no)
    }

    /// Get as integer
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Big-endian storage key (sorts ascending)
    pub fn key_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for AccountNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account row
///
/// `reserved_amount` is a cache of the sum of amounts of this account's
/// PENDING scheduled payments. It is maintained incrementally by every
/// lifecycle transition and can be recomputed from the live pending set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account number (unique)
    pub number: AccountNo,

    /// Owner reference (customer model is external)
    pub owner_id: Uuid,

    /// Hard balance (exact decimal)
    pub balance: Decimal,

    /// Funds soft-held for pending scheduled payments (>= 0)
    pub reserved_amount: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with an opening balance and no reservations
    pub fn new(number: AccountNo, owner_id: Uuid, opening_balance: Decimal) -> Self {
        Self {
            number,
            owner_id,
            balance: opening_balance,
            reserved_amount: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Amount immediately available for new transfers or schedules
    pub fn spendable_amount(&self) -> Decimal {
        self.balance - self.reserved_amount
    }
}

/// Immutable record of a completed money movement
///
/// Created only by the transfer engine, inside the same atomic unit of work
/// as the balance updates it describes. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Unique transfer ID (UUIDv7 for time-ordering)
    pub transfer_id: Uuid,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Debited account
    pub from_account: AccountNo,

    /// Credited account
    pub to_account: AccountNo,

    /// Amount moved (exact decimal, > 0)
    pub amount: Decimal,
}

impl Transfer {
    /// Create a new transfer record
    pub fn new(from_account: AccountNo, to_account: AccountNo, amount: Decimal) -> Self {
        Self {
            transfer_id: Uuid::now_v7(),
            created_at: Utc::now(),
            from_account,
            to_account,
            amount,
        }
    }
}

/// Scheduled payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    /// Waiting for its due instant; funds reserved on the from-account
    Pending = 0,
    /// Settled into a transfer (terminal)
    Done = 1,
    /// Canceled before settlement (terminal)
    Canceled = 2,
    /// Settlement attempted but balance was insufficient (terminal)
    Failed = 3,
}

impl PaymentStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Done | PaymentStatus::Canceled | PaymentStatus::Failed
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Done => "done",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Deferred transfer intent
///
/// Lifecycle: created PENDING with `amount` reserved on `from_account`;
/// transitions exactly once to DONE, FAILED, or CANCELED, releasing the
/// reservation in the same unit of work. Rows are never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    /// Unique payment ID
    pub payment_id: Uuid,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,

    /// Debited account
    pub from_account: AccountNo,

    /// Credited account
    pub to_account: AccountNo,

    /// Amount to move at settlement (exact decimal, > 0)
    pub amount: Decimal,

    /// Instant at which the payment becomes eligible for settlement
    pub on_date: DateTime<Utc>,

    /// Current lifecycle status
    pub status: PaymentStatus,

    /// Transfer produced by a DONE settlement
    pub transfer_id: Option<Uuid>,
}

impl ScheduledPayment {
    /// Create a new pending payment
    pub fn new(
        from_account: AccountNo,
        to_account: AccountNo,
        amount: Decimal,
        on_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            payment_id: Uuid::now_v7(),
            created_at: now,
            updated_at: now,
            from_account,
            to_account,
            amount,
            on_date,
            status: PaymentStatus::Pending,
            transfer_id: None,
        }
    }

    /// Due at or before the given instant
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.on_date <= as_of
    }
}

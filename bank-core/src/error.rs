//! Error types for the bank ledger

use crate::types::{AccountNo, PaymentStatus};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount parameter was negative
    #[error("Negative amount: {0}")]
    NegativeAmount(Decimal),

    /// Balance (or spendable amount, for schedules) too low
    #[error("Insufficient balance on account {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Account that failed the check
        account: AccountNo,
        /// Amount requested
        requested: Decimal,
        /// Amount available for the operation
        available: Decimal,
    },

    /// Transfer or schedule between an account and itself
    #[error("Account {0} cannot transfer to itself")]
    SameAccount(AccountNo),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(AccountNo),

    /// Account number already taken
    #[error("Account already exists: {0}")]
    AccountExists(AccountNo),

    /// Scheduled payment not found
    #[error("Scheduled payment not found: {0}")]
    PaymentNotFound(Uuid),

    /// Transfer not found
    #[error("Transfer not found: {0}")]
    TransferNotFound(Uuid),

    /// Transition attempted on a scheduled payment already in a terminal state
    #[error("Scheduled payment {payment_id} is already terminal ({status})")]
    AlreadyTerminal {
        /// Payment the transition was attempted on
        payment_id: Uuid,
        /// Its terminal status
        status: PaymentStatus,
    },

    /// Physical deletion of scheduled payments is not supported
    #[error("Deleting scheduled payments is not allowed; cancel them instead")]
    DeleteNotAllowed,

    /// Timed out waiting for an account row lock (transient, retryable)
    #[error("Timed out waiting for lock on account {0}")]
    LockTimeout(AccountNo),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures the caller should retry with backoff rather than
    /// treat as a business error
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout(_) | Error::Storage(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::LockTimeout(AccountNo::new(1)).is_transient());
        assert!(Error::Storage("write stall".to_string()).is_transient());
        assert!(!Error::NegativeAmount(Decimal::from(-1)).is_transient());
        assert!(!Error::DeleteNotAllowed.is_transient());
    }
}

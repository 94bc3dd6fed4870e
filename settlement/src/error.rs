//! Error types for the settlement crate

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error (business rules and storage)
    #[error("Ledger error: {0}")]
    Ledger(#[from] bank_core::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures the scheduler should retry next tick rather than
    /// treat as a settled outcome
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Ledger(e) if e.is_transient())
    }
}

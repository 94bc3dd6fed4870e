//! Main ledger orchestration layer
//!
//! Ties storage and the lock table into a high-level API: account
//! management, the spendable/reserved queries, and the transfer engine.
//!
//! # Example
//!
//! ```no_run
//! use bank_core::{AccountNo, Config, Ledger};
//! use rust_decimal::Decimal;
//! use uuid::Uuid;
//!
//! fn main() -> bank_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let alice = AccountNo::new(1);
//!     let bob = AccountNo::new(2);
//!     ledger.create_account(alice, Uuid::new_v4(), Decimal::from(1000))?;
//!     ledger.create_account(bob, Uuid::new_v4(), Decimal::ZERO)?;
//!
//!     let transfer = ledger.transfer(alice, bob, Decimal::from(100))?;
//!     println!("moved {} in transfer {}", transfer.amount, transfer.transfer_id);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    error::{Error, Result},
    storage::Storage,
    txn::{LockTable, UnitOfWork},
    types::{Account, AccountNo, ScheduledPayment, Transfer},
    Config,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Main ledger interface
pub struct Ledger {
    /// Durable store
    storage: Arc<Storage>,

    /// Per-account row locks
    locks: LockTable,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("service_name", &self.config.service_name)
            .finish()
    }
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let locks = LockTable::new(Duration::from_millis(config.lock_wait_ms));

        Ok(Self {
            storage,
            locks,
            config,
        })
    }

    /// Begin a unit of work over the given account rows
    ///
    /// Rows are locked in ascending account-number order and read under the
    /// lock. Used directly by the scheduled-payment lifecycle; the operations
    /// below wrap it for the immediate path.
    pub fn unit_of_work(&self, accounts: &[AccountNo]) -> Result<UnitOfWork<'_>> {
        UnitOfWork::begin(&self.storage, &self.locks, accounts)
    }

    // Account management

    /// Create an account with an opening balance
    pub fn create_account(
        &self,
        number: AccountNo,
        owner_id: Uuid,
        opening_balance: Decimal,
    ) -> Result<Account> {
        if opening_balance < Decimal::ZERO {
            return Err(Error::NegativeAmount(opening_balance));
        }

        // Hold the row lock across the existence check and the insert
        let _guards = self.locks.lock_ordered(&[number])?;
        if self.storage.maybe_account(number)?.is_some() {
            return Err(Error::AccountExists(number));
        }

        let account = Account::new(number, owner_id, opening_balance);
        let mut batch = rocksdb::WriteBatch::default();
        self.storage.stage_account(&mut batch, &account)?;
        self.storage.write(batch)?;

        tracing::info!(account = %number, %opening_balance, "Account created");

        Ok(account)
    }

    /// Get account row
    pub fn account(&self, number: AccountNo) -> Result<Account> {
        self.storage.get_account(number)
    }

    /// Whether the account exists
    pub fn account_exists(&self, number: AccountNo) -> Result<bool> {
        Ok(self.storage.maybe_account(number)?.is_some())
    }

    // Account ledger queries

    /// Balance minus reserved amount; what new transfers or schedules may use
    pub fn spendable_amount(&self, number: AccountNo) -> Result<Decimal> {
        Ok(self.storage.get_account(number)?.spendable_amount())
    }

    /// Sum of amounts of the account's PENDING scheduled payments, from the
    /// live pending set (not the cached `reserved_amount`)
    pub fn reserved_for_pending(&self, number: AccountNo) -> Result<Decimal> {
        // Existence check first so a missing account is not reported as zero
        self.storage.get_account(number)?;

        Ok(self
            .storage
            .pending_payments_for(number)?
            .iter()
            .map(|p| p.amount)
            .sum())
    }

    /// Recompute and persist `reserved_amount` from the live PENDING set
    ///
    /// Repair/reconciliation path; the transactional operations maintain the
    /// cache incrementally and never call this.
    pub fn recompute_reserved(&self, number: AccountNo) -> Result<Account> {
        let mut uow = self.unit_of_work(&[number])?;

        // Transitions hold this account's lock, so the pending set is stable
        let reserved: Decimal = self
            .storage
            .pending_payments_for(number)?
            .iter()
            .map(|p| p.amount)
            .sum();

        uow.set_reserved(number, reserved)?;
        let account = uow.account(number)?.clone();
        uow.commit()?;

        tracing::info!(account = %number, %reserved, "Reserved amount recomputed");

        Ok(account)
    }

    // Transfer engine

    /// Move `amount` between two accounts as a single atomic unit of work
    ///
    /// Checked against the raw balance, not the spendable amount: the
    /// immediate path does not consult reservations.
    pub fn transfer(&self, from: AccountNo, to: AccountNo, amount: Decimal) -> Result<Transfer> {
        let mut uow = self.unit_of_work(&[from, to])?;
        let transfer = self.transfer_in(&mut uow, from, to, amount)?;
        uow.commit()?;

        tracing::info!(
            transfer_id = %transfer.transfer_id,
            %from,
            %to,
            %amount,
            "Transfer completed"
        );

        Ok(transfer)
    }

    /// Stage a transfer inside an existing unit of work
    ///
    /// Used by settlement so the transfer commits (or rolls back) together
    /// with the scheduled payment's transition. Stages nothing when it
    /// returns an error.
    pub fn transfer_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        from: AccountNo,
        to: AccountNo,
        amount: Decimal,
    ) -> Result<Transfer> {
        if amount < Decimal::ZERO {
            return Err(Error::NegativeAmount(amount));
        }
        if from == to {
            return Err(Error::SameAccount(from));
        }

        let balance = uow.account(from)?.balance;
        if balance < amount {
            return Err(Error::InsufficientBalance {
                account: from,
                requested: amount,
                available: balance,
            });
        }

        uow.adjust_balance(from, -amount)?;
        uow.adjust_balance(to, amount)?;

        let transfer = Transfer::new(from, to, amount);
        uow.record_transfer(&transfer)?;

        Ok(transfer)
    }

    // Readers

    /// Get transfer by ID
    pub fn get_transfer(&self, transfer_id: Uuid) -> Result<Transfer> {
        self.storage.get_transfer(transfer_id)
    }

    /// Get scheduled payment by ID
    pub fn scheduled_payment(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        self.storage.get_scheduled(payment_id)
    }

    /// All PENDING scheduled payments due at or before `as_of`, oldest first
    pub fn due_pending(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.storage.list_due_pending(as_of)
    }
}

//! Units of work with per-account row locks
//!
//! Every balance or reservation mutation happens through a [`UnitOfWork`]:
//! the account rows it touches are locked in ascending account-number order
//! before they are read, all writes are staged into one RocksDB `WriteBatch`,
//! and `commit` makes them durable together with the business record
//! (transfer or scheduled payment) that caused them. Dropping a unit of work
//! without committing discards every staged mutation.
//!
//! The ascending lock order is a total order over account numbers, so two
//! units locking the same pair of accounts in opposite call order cannot
//! deadlock. Lock waits are bounded; expiry surfaces as a retryable
//! [`Error::LockTimeout`].

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Account, AccountNo, ScheduledPayment, Transfer},
};
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rocksdb::WriteBatch;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

type AccountGuard = ArcMutexGuard<RawMutex, ()>;

/// Per-account lock table
///
/// One mutex per account number, created lazily and never removed (accounts
/// are never deleted). Equivalent of the store's row-level `SELECT ... FOR
/// UPDATE` lock, held until the unit of work commits or is dropped.
pub struct LockTable {
    locks: DashMap<AccountNo, Arc<Mutex<()>>>,
    wait: Duration,
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("accounts", &self.locks.len())
            .field("wait", &self.wait)
            .finish()
    }
}

impl LockTable {
    /// Create a lock table with the given bounded wait
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            wait,
        }
    }

    fn handle(&self, number: AccountNo) -> Arc<Mutex<()>> {
        self.locks
            .entry(number)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock the given accounts in ascending account-number order
    pub fn lock_ordered(&self, accounts: &[AccountNo]) -> Result<Vec<AccountGuard>> {
        let mut numbers: Vec<AccountNo> = accounts.to_vec();
        numbers.sort_unstable();
        numbers.dedup();

        let mut guards = Vec::with_capacity(numbers.len());
        for number in numbers {
            let lock = self.handle(number);
            let guard = lock
                .try_lock_arc_for(self.wait)
                .ok_or(Error::LockTimeout(number))?;
            guards.push(guard);
        }

        Ok(guards)
    }
}

/// An all-or-nothing unit of work over a set of locked account rows
///
/// Account rows are read once at `begin` and then served from an overlay, so
/// a later read inside the unit observes earlier staged mutations
/// (read-your-writes). Nothing reaches the store before `commit`.
pub struct UnitOfWork<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    accounts: BTreeMap<AccountNo, Account>,
    _guards: Vec<AccountGuard>,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> UnitOfWork<'a> {
    /// Lock the given accounts and load their rows into the overlay
    pub(crate) fn begin(
        storage: &'a Storage,
        locks: &LockTable,
        accounts: &[AccountNo],
    ) -> Result<Self> {
        let guards = locks.lock_ordered(accounts)?;

        // Rows are read only after the locks are held
        let mut overlay = BTreeMap::new();
        for &number in accounts {
            if !overlay.contains_key(&number) {
                overlay.insert(number, storage.get_account(number)?);
            }
        }

        Ok(Self {
            storage,
            batch: WriteBatch::default(),
            accounts: overlay,
            _guards: guards,
        })
    }

    /// Current state of a locked account row, including staged mutations
    pub fn account(&self, number: AccountNo) -> Result<&Account> {
        self.accounts
            .get(&number)
            .ok_or(Error::AccountNotFound(number))
    }

    fn account_mut(&mut self, number: AccountNo) -> Result<&mut Account> {
        self.accounts
            .get_mut(&number)
            .ok_or(Error::AccountNotFound(number))
    }

    /// Apply a signed delta to an account's balance
    pub fn adjust_balance(&mut self, number: AccountNo, delta: Decimal) -> Result<()> {
        let account = self.account_mut(number)?;
        account.balance += delta;
        Ok(())
    }

    /// Apply a signed delta to an account's reserved amount
    pub fn adjust_reserved(&mut self, number: AccountNo, delta: Decimal) -> Result<()> {
        let account = self.account_mut(number)?;
        account.reserved_amount += delta;
        debug_assert!(account.reserved_amount >= Decimal::ZERO);
        Ok(())
    }

    /// Overwrite an account's reserved amount (reconciliation path)
    pub fn set_reserved(&mut self, number: AccountNo, reserved: Decimal) -> Result<()> {
        let account = self.account_mut(number)?;
        account.reserved_amount = reserved;
        Ok(())
    }

    /// Stage an immutable transfer record
    pub fn record_transfer(&mut self, transfer: &Transfer) -> Result<()> {
        self.storage.stage_transfer(&mut self.batch, transfer)
    }

    /// Stage a new PENDING scheduled payment
    pub fn insert_scheduled(&mut self, payment: &ScheduledPayment) -> Result<()> {
        self.storage.stage_scheduled_insert(&mut self.batch, payment)
    }

    /// Stage a scheduled payment's transition out of PENDING
    pub fn transition_scheduled(&mut self, payment: &ScheduledPayment) -> Result<()> {
        self.storage
            .stage_scheduled_transition(&mut self.batch, payment)
    }

    /// Commit every staged mutation atomically, then release the row locks
    pub fn commit(mut self) -> Result<()> {
        for account in self.accounts.values() {
            self.storage.stage_account(&mut self.batch, account)?;
        }
        self.storage.write(self.batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_lock_ordered_dedups() {
        let table = LockTable::new(Duration::from_millis(100));
        let a = AccountNo::new(1);

        // Same account twice must not self-deadlock
        let guards = table.lock_ordered(&[a, a]).unwrap();
        assert_eq!(guards.len(), 1);
    }

    #[test]
    fn test_lock_timeout_is_bounded() {
        let table = LockTable::new(Duration::from_millis(50));
        let a = AccountNo::new(1);

        let _held = table.lock_ordered(&[a]).unwrap();

        let start = Instant::now();
        let result = table.lock_ordered(&[a]);
        assert!(matches!(result, Err(Error::LockTimeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_disjoint_accounts_do_not_contend() {
        let table = LockTable::new(Duration::from_millis(50));

        let _first = table.lock_ordered(&[AccountNo::new(1)]).unwrap();
        let second = table.lock_ordered(&[AccountNo::new(2)]);
        assert!(second.is_ok());
    }
}

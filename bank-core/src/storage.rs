//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account number, big-endian)
//! - `transfers` - Immutable transfer records (key: transfer_id)
//! - `scheduled` - Scheduled payment rows (key: payment_id)
//! - `indices` - Secondary indices for the settlement queries
//!
//! # Indices
//!
//! Two index families live in the `indices` CF, distinguished by a tag byte:
//!
//! - due index: `0x01 || on_date (sign-flipped nanos, big-endian) || payment_id`
//!   for PENDING payments only. An ascending scan yields due payments
//!   oldest-first and can stop at the first entry past the cutoff.
//! - account index: `0x02 || account number (big-endian) || payment_id`
//!   for PENDING payments only, used to recompute `reserved_amount`.
//!
//! Both entries are written with the payment row in one `WriteBatch` and
//! removed in the batch that transitions the payment out of PENDING.

use crate::{
    error::{Error, Result},
    types::{Account, AccountNo, ScheduledPayment, Transfer},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSFERS: &str = "transfers";
const CF_SCHEDULED: &str = "scheduled";
const CF_INDICES: &str = "indices";

/// Index tag bytes
const IDX_DUE: u8 = 0x01;
const IDX_ACCOUNT_PENDING: u8 = 0x02;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_TRANSFERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_SCHEDULED, Options::default()),
            ColumnFamilyDescriptor::new(CF_INDICES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Get account row, if present
    pub fn maybe_account(&self, number: AccountNo) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        match self.db.get_cf(cf, number.key_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get account row
    pub fn get_account(&self, number: AccountNo) -> Result<Account> {
        self.maybe_account(number)?
            .ok_or(Error::AccountNotFound(number))
    }

    /// Stage an account row into a write batch
    pub fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        batch.put_cf(cf, account.number.key_bytes(), &value);
        Ok(())
    }

    // Transfer operations

    /// Get transfer by ID
    pub fn get_transfer(&self, transfer_id: Uuid) -> Result<Transfer> {
        let cf = self.cf_handle(CF_TRANSFERS)?;

        let value = self
            .db
            .get_cf(cf, transfer_id.as_bytes())?
            .ok_or(Error::TransferNotFound(transfer_id))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Stage an immutable transfer record into a write batch
    pub fn stage_transfer(&self, batch: &mut WriteBatch, transfer: &Transfer) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSFERS)?;
        let value = bincode::serialize(transfer)?;
        batch.put_cf(cf, transfer.transfer_id.as_bytes(), &value);
        Ok(())
    }

    // Scheduled payment operations

    /// Get scheduled payment by ID
    pub fn get_scheduled(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        let cf = self.cf_handle(CF_SCHEDULED)?;

        let value = self
            .db
            .get_cf(cf, payment_id.as_bytes())?
            .ok_or(Error::PaymentNotFound(payment_id))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Stage a new PENDING payment row and its index entries
    pub fn stage_scheduled_insert(
        &self,
        batch: &mut WriteBatch,
        payment: &ScheduledPayment,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_SCHEDULED)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let value = bincode::serialize(payment)?;
        batch.put_cf(cf, payment.payment_id.as_bytes(), &value);

        batch.put_cf(
            cf_indices,
            due_index_key(payment.on_date, payment.payment_id),
            b"",
        );
        batch.put_cf(
            cf_indices,
            account_index_key(payment.from_account, payment.payment_id),
            b"",
        );

        Ok(())
    }

    /// Stage a transition out of PENDING: updated row, index entries removed
    pub fn stage_scheduled_transition(
        &self,
        batch: &mut WriteBatch,
        payment: &ScheduledPayment,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_SCHEDULED)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let value = bincode::serialize(payment)?;
        batch.put_cf(cf, payment.payment_id.as_bytes(), &value);

        batch.delete_cf(cf_indices, due_index_key(payment.on_date, payment.payment_id));
        batch.delete_cf(
            cf_indices,
            account_index_key(payment.from_account, payment.payment_id),
        );

        Ok(())
    }

    // Settlement queries

    /// All PENDING payments with `on_date <= as_of`, oldest due first
    pub fn list_due_pending(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cutoff = ts_key(as_of);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&[IDX_DUE], Direction::Forward));

        let mut due = Vec::new();
        for item in iter {
            let (key, _) = item?;

            if key.first() != Some(&IDX_DUE) || key.len() != 25 {
                break;
            }
            if key[1..9] > cutoff[..] {
                break;
            }

            let id_bytes: [u8; 16] = key[9..25]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt due index key".to_string()))?;
            due.push(Uuid::from_bytes(id_bytes));
        }

        Ok(due)
    }

    /// All PENDING payments debiting the given account
    pub fn pending_payments_for(&self, number: AccountNo) -> Result<Vec<ScheduledPayment>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut prefix = Vec::with_capacity(9);
        prefix.push(IDX_ACCOUNT_PENDING);
        prefix.extend_from_slice(&number.key_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut payments = Vec::new();
        for item in iter {
            let (key, _) = item?;

            if key.len() != 25 || key[..9] != prefix[..] {
                break;
            }

            let id_bytes: [u8; 16] = key[9..25]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt account index key".to_string()))?;
            let payment = self.get_scheduled(Uuid::from_bytes(id_bytes))?;

            if payment.status == crate::types::PaymentStatus::Pending {
                payments.push(payment);
            }
        }

        Ok(payments)
    }

    /// Commit a staged batch atomically
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }
}

/// Sign-flipped big-endian nanosecond timestamp, so keys sort chronologically
fn ts_key(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn due_index_key(on_date: DateTime<Utc>, payment_id: Uuid) -> [u8; 25] {
    let mut key = [0u8; 25];
    key[0] = IDX_DUE;
    key[1..9].copy_from_slice(&ts_key(on_date));
    key[9..25].copy_from_slice(payment_id.as_bytes());
    key
}

fn account_index_key(number: AccountNo, payment_id: Uuid) -> [u8; 25] {
    let mut key = [0u8; 25];
    key[0] = IDX_ACCOUNT_PENDING;
    key[1..9].copy_from_slice(&number.key_bytes());
    key[9..25].copy_from_slice(payment_id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Storage::open(&config).unwrap();
        (storage, temp_dir)
    }

    fn put_payment(storage: &Storage, payment: &ScheduledPayment) {
        let mut batch = WriteBatch::default();
        storage.stage_scheduled_insert(&mut batch, payment).unwrap();
        storage.write(batch).unwrap();
    }

    #[test]
    fn test_account_roundtrip() {
        let (storage, _temp) = test_storage();

        let account = Account::new(AccountNo::new(123), Uuid::new_v4(), Decimal::from(1000));
        let mut batch = WriteBatch::default();
        storage.stage_account(&mut batch, &account).unwrap();
        storage.write(batch).unwrap();

        let retrieved = storage.get_account(AccountNo::new(123)).unwrap();
        assert_eq!(retrieved, account);

        assert!(matches!(
            storage.get_account(AccountNo::new(456)),
            Err(Error::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_transfer_roundtrip() {
        let (storage, _temp) = test_storage();

        let transfer = Transfer::new(AccountNo::new(1), AccountNo::new(2), Decimal::from(100));
        let mut batch = WriteBatch::default();
        storage.stage_transfer(&mut batch, &transfer).unwrap();
        storage.write(batch).unwrap();

        let retrieved = storage.get_transfer(transfer.transfer_id).unwrap();
        assert_eq!(retrieved, transfer);
    }

    #[test]
    fn test_due_pending_cutoff_and_order() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let overdue = ScheduledPayment::new(
            AccountNo::new(1),
            AccountNo::new(2),
            Decimal::from(10),
            now - Duration::hours(2),
        );
        let just_due = ScheduledPayment::new(
            AccountNo::new(1),
            AccountNo::new(2),
            Decimal::from(20),
            now - Duration::minutes(1),
        );
        let future = ScheduledPayment::new(
            AccountNo::new(1),
            AccountNo::new(2),
            Decimal::from(30),
            now + Duration::days(1),
        );

        // Insertion order deliberately shuffled
        put_payment(&storage, &just_due);
        put_payment(&storage, &future);
        put_payment(&storage, &overdue);

        let due = storage.list_due_pending(now).unwrap();
        assert_eq!(due, vec![overdue.payment_id, just_due.payment_id]);
    }

    #[test]
    fn test_transition_removes_indices() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let mut payment = ScheduledPayment::new(
            AccountNo::new(7),
            AccountNo::new(8),
            Decimal::from(50),
            now - Duration::minutes(5),
        );
        put_payment(&storage, &payment);

        assert_eq!(storage.list_due_pending(now).unwrap().len(), 1);
        assert_eq!(storage.pending_payments_for(AccountNo::new(7)).unwrap().len(), 1);

        payment.status = PaymentStatus::Canceled;
        let mut batch = WriteBatch::default();
        storage.stage_scheduled_transition(&mut batch, &payment).unwrap();
        storage.write(batch).unwrap();

        assert!(storage.list_due_pending(now).unwrap().is_empty());
        assert!(storage.pending_payments_for(AccountNo::new(7)).unwrap().is_empty());

        // The row itself survives the transition
        let retrieved = storage.get_scheduled(payment.payment_id).unwrap();
        assert_eq!(retrieved.status, PaymentStatus::Canceled);
    }

    #[test]
    fn test_pending_payments_for_scopes_by_account() {
        let (storage, _temp) = test_storage();
        let on_date = Utc::now() + Duration::days(1);

        for _ in 0..3 {
            put_payment(
                &storage,
                &ScheduledPayment::new(AccountNo::new(1), AccountNo::new(2), Decimal::from(5), on_date),
            );
        }
        put_payment(
            &storage,
            &ScheduledPayment::new(AccountNo::new(2), AccountNo::new(1), Decimal::from(5), on_date),
        );

        assert_eq!(storage.pending_payments_for(AccountNo::new(1)).unwrap().len(), 3);
        assert_eq!(storage.pending_payments_for(AccountNo::new(2)).unwrap().len(), 1);
    }
}

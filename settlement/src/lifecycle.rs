//! Scheduled payment lifecycle
//!
//! State machine: `PENDING -> {DONE, FAILED, CANCELED}`, all transitions
//! one-way and terminal. Every transition runs as one unit of work that
//! updates the payment row, the paying account's reservation, and (for DONE)
//! the transfer record together, so reservation and status are never
//! observed out of sync.

use crate::{Error, Result};
use bank_core::{AccountNo, Ledger, PaymentStatus, ScheduledPayment};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Scheduled payment service
pub struct ScheduledPayments {
    /// Bank ledger (accounts, transfers, row locks)
    ledger: Arc<Ledger>,
}

impl std::fmt::Debug for ScheduledPayments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledPayments").finish()
    }
}

impl ScheduledPayments {
    /// Create the service over a ledger
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// The underlying ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Schedule a payment for a future (or past) instant, reserving the funds
    ///
    /// The check runs against the *spendable* amount (balance minus existing
    /// reservations), so multiple pending schedules cannot over-commit the
    /// account. No balance moves until settlement.
    pub fn schedule(
        &self,
        from: AccountNo,
        to: AccountNo,
        amount: Decimal,
        on_date: DateTime<Utc>,
    ) -> Result<ScheduledPayment> {
        if amount < Decimal::ZERO {
            return Err(bank_core::Error::NegativeAmount(amount).into());
        }
        if from == to {
            return Err(bank_core::Error::SameAccount(from).into());
        }
        // Only the from-row is mutated, but the counterparty must exist
        if !self.ledger.account_exists(to)? {
            return Err(bank_core::Error::AccountNotFound(to).into());
        }

        let mut uow = self.ledger.unit_of_work(&[from])?;

        let spendable = uow.account(from)?.spendable_amount();
        if spendable < amount {
            return Err(bank_core::Error::InsufficientBalance {
                account: from,
                requested: amount,
                available: spendable,
            }
            .into());
        }

        uow.adjust_reserved(from, amount)?;
        let payment = ScheduledPayment::new(from, to, amount, on_date);
        uow.insert_scheduled(&payment)?;
        uow.commit()?;

        tracing::info!(
            payment_id = %payment.payment_id,
            %from,
            %to,
            %amount,
            on_date = %on_date,
            "Scheduled payment created"
        );

        Ok(payment)
    }

    /// Settle a PENDING payment: attempt the transfer, record the outcome
    ///
    /// DONE on success, FAILED if the balance no longer covers the amount at
    /// settlement time. Both outcomes release the reservation exactly once,
    /// in the same commit as the status change. Any other transfer failure
    /// propagates and nothing commits, leaving the payment PENDING for retry.
    pub fn settle(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        // First read just discovers the accounts to lock
        let head = self.ledger.scheduled_payment(payment_id)?;
        if head.status.is_terminal() {
            return Err(Error::Ledger(bank_core::Error::AlreadyTerminal {
                payment_id,
                status: head.status,
            }));
        }

        let mut uow = self
            .ledger
            .unit_of_work(&[head.from_account, head.to_account])?;

        // Re-read under the from-row lock; a concurrent cancel or settle
        // would have transitioned it before we acquired the lock
        let mut payment = self.ledger.scheduled_payment(payment_id)?;
        if payment.status != PaymentStatus::Pending {
            return Err(Error::Ledger(bank_core::Error::AlreadyTerminal {
                payment_id,
                status: payment.status,
            }));
        }

        match self.ledger.transfer_in(
            &mut uow,
            payment.from_account,
            payment.to_account,
            payment.amount,
        ) {
            Ok(transfer) => {
                payment.transfer_id = Some(transfer.transfer_id);
                payment.status = PaymentStatus::Done;
            }
            Err(bank_core::Error::InsufficientBalance { .. }) => {
                payment.status = PaymentStatus::Failed;
            }
            Err(e) => return Err(e.into()),
        }

        uow.adjust_reserved(payment.from_account, -payment.amount)?;
        payment.updated_at = Utc::now();
        uow.transition_scheduled(&payment)?;
        uow.commit()?;

        match payment.status {
            PaymentStatus::Done => tracing::info!(
                payment_id = %payment.payment_id,
                transfer_id = ?payment.transfer_id,
                "Scheduled payment settled"
            ),
            _ => tracing::warn!(
                payment_id = %payment.payment_id,
                "Scheduled payment failed: insufficient balance at settlement"
            ),
        }

        Ok(payment)
    }

    /// Cancel a PENDING payment, releasing its reservation
    pub fn cancel(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        let head = self.ledger.scheduled_payment(payment_id)?;
        if head.status.is_terminal() {
            return Err(Error::Ledger(bank_core::Error::AlreadyTerminal {
                payment_id,
                status: head.status,
            }));
        }

        let mut uow = self.ledger.unit_of_work(&[head.from_account])?;

        let mut payment = self.ledger.scheduled_payment(payment_id)?;
        if payment.status != PaymentStatus::Pending {
            return Err(Error::Ledger(bank_core::Error::AlreadyTerminal {
                payment_id,
                status: payment.status,
            }));
        }

        uow.adjust_reserved(payment.from_account, -payment.amount)?;
        payment.status = PaymentStatus::Canceled;
        payment.updated_at = Utc::now();
        uow.transition_scheduled(&payment)?;
        uow.commit()?;

        tracing::info!(payment_id = %payment.payment_id, "Scheduled payment canceled");

        Ok(payment)
    }

    /// Delete request on a single payment: redirected to cancellation
    ///
    /// The row is never physically removed; the terminal CANCELED status is
    /// the durable record of the deletion.
    pub fn delete(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        self.cancel(payment_id)
    }

    /// Bulk deletion of scheduled payments is categorically unsupported
    ///
    /// Refuses the whole operation and touches no row; callers must cancel
    /// payments individually instead.
    pub fn delete_all(&self) -> Result<()> {
        Err(Error::Ledger(bank_core::Error::DeleteNotAllowed))
    }

    /// All PENDING payments with `on_date <= as_of`, oldest due first
    pub fn due_pending(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self.ledger.due_pending(as_of)?)
    }

    /// Get a scheduled payment by ID
    pub fn get(&self, payment_id: Uuid) -> Result<ScheduledPayment> {
        Ok(self.ledger.scheduled_payment(payment_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::Config;
    use chrono::Duration;

    fn test_service() -> (ScheduledPayments, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let ledger = Arc::new(Ledger::open(config).unwrap());

        ledger
            .create_account(AccountNo::new(123), Uuid::new_v4(), Decimal::from(1000))
            .unwrap();
        ledger
            .create_account(AccountNo::new(456), Uuid::new_v4(), Decimal::from(1000))
            .unwrap();

        (ScheduledPayments::new(ledger), temp_dir)
    }

    fn in_ten_days() -> DateTime<Utc> {
        Utc::now() + Duration::days(10)
    }

    #[test]
    fn test_schedule_reserves_funds() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);

        let payment = payments
            .schedule(a, AccountNo::new(456), Decimal::from(100), in_ten_days())
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);

        let ledger = payments.ledger();
        let account = ledger.account(a).unwrap();
        assert_eq!(account.reserved_amount, Decimal::from(100));
        assert_eq!(account.balance, Decimal::from(1000)); // No balance moved
        assert_eq!(ledger.reserved_for_pending(a).unwrap(), Decimal::from(100));
    }

    #[test]
    fn test_settle_done() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);
        let b = AccountNo::new(456);

        let payment = payments
            .schedule(a, b, Decimal::from(100), in_ten_days())
            .unwrap();
        assert!(payment.transfer_id.is_none());

        let settled = payments.settle(payment.payment_id).unwrap();
        assert_eq!(settled.status, PaymentStatus::Done);
        assert!(settled.transfer_id.is_some());

        let ledger = payments.ledger();
        assert_eq!(ledger.account(a).unwrap().balance, Decimal::from(900));
        assert_eq!(ledger.account(b).unwrap().balance, Decimal::from(1100));
        assert_eq!(ledger.account(a).unwrap().reserved_amount, Decimal::ZERO);

        // The linked transfer exists
        let transfer = ledger.get_transfer(settled.transfer_id.unwrap()).unwrap();
        assert_eq!(transfer.amount, Decimal::from(100));
    }

    #[test]
    fn test_settle_failed_on_insufficient_balance() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);
        let b = AccountNo::new(456);

        let payment = payments
            .schedule(a, b, Decimal::from(800), in_ten_days())
            .unwrap();

        // Drain the balance below the scheduled amount before settlement.
        // The reservation does not stop the unconditional immediate path.
        payments.ledger().transfer(a, b, Decimal::from(900)).unwrap();

        let settled = payments.settle(payment.payment_id).unwrap();
        assert_eq!(settled.status, PaymentStatus::Failed);
        assert!(settled.transfer_id.is_none());

        // Reservation released anyway, exactly once
        let ledger = payments.ledger();
        assert_eq!(ledger.account(a).unwrap().reserved_amount, Decimal::ZERO);
        assert_eq!(ledger.account(a).unwrap().balance, Decimal::from(100));
        assert_eq!(ledger.account(b).unwrap().balance, Decimal::from(1900));
    }

    #[test]
    fn test_cancel_round_trip() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);

        let before = payments.ledger().account(a).unwrap().reserved_amount;
        let payment = payments
            .schedule(a, AccountNo::new(456), Decimal::from(100), in_ten_days())
            .unwrap();

        let canceled = payments.cancel(payment.payment_id).unwrap();
        assert_eq!(canceled.status, PaymentStatus::Canceled);

        let account = payments.ledger().account(a).unwrap();
        assert_eq!(account.reserved_amount, before);
        assert_eq!(
            payments.ledger().reserved_for_pending(a).unwrap(),
            account.reserved_amount
        );
    }

    #[test]
    fn test_terminal_transitions_rejected() {
        let (payments, _temp) = test_service();

        let payment = payments
            .schedule(
                AccountNo::new(123),
                AccountNo::new(456),
                Decimal::from(100),
                in_ten_days(),
            )
            .unwrap();
        payments.cancel(payment.payment_id).unwrap();

        // Double cancel must not release the reservation twice
        let again = payments.cancel(payment.payment_id);
        assert!(matches!(
            again,
            Err(Error::Ledger(bank_core::Error::AlreadyTerminal { .. }))
        ));

        let settle = payments.settle(payment.payment_id);
        assert!(matches!(
            settle,
            Err(Error::Ledger(bank_core::Error::AlreadyTerminal { .. }))
        ));

        let account = payments.ledger().account(AccountNo::new(123)).unwrap();
        assert_eq!(account.reserved_amount, Decimal::ZERO);
    }

    #[test]
    fn test_over_commitment_rejected() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);
        let b = AccountNo::new(456);

        // Ten schedules of 100 exhaust the spendable amount of 1000
        for _ in 0..10 {
            payments
                .schedule(a, b, Decimal::from(100), in_ten_days())
                .unwrap();
        }
        assert_eq!(payments.ledger().spendable_amount(a).unwrap(), Decimal::ZERO);

        let eleventh = payments.schedule(a, b, Decimal::from(100), in_ten_days());
        assert!(matches!(
            eleventh,
            Err(Error::Ledger(bank_core::Error::InsufficientBalance { .. }))
        ));
        assert_eq!(
            payments.ledger().account(a).unwrap().reserved_amount,
            Decimal::from(1000)
        );
    }

    #[test]
    fn test_negative_amount_rejected() {
        let (payments, _temp) = test_service();

        let result = payments.schedule(
            AccountNo::new(123),
            AccountNo::new(456),
            Decimal::from(-1),
            in_ten_days(),
        );
        assert!(matches!(
            result,
            Err(Error::Ledger(bank_core::Error::NegativeAmount(_)))
        ));
    }

    #[test]
    fn test_delete_redirects_to_cancel() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);

        let payment = payments
            .schedule(a, AccountNo::new(456), Decimal::from(100), in_ten_days())
            .unwrap();

        let deleted = payments.delete(payment.payment_id).unwrap();
        assert_eq!(deleted.status, PaymentStatus::Canceled);

        // The row still exists
        let row = payments.get(payment.payment_id).unwrap();
        assert_eq!(row.status, PaymentStatus::Canceled);
        assert_eq!(payments.ledger().account(a).unwrap().reserved_amount, Decimal::ZERO);
    }

    #[test]
    fn test_bulk_delete_refused() {
        let (payments, _temp) = test_service();

        let mut ids = Vec::new();
        for _ in 0..10 {
            let payment = payments
                .schedule(
                    AccountNo::new(123),
                    AccountNo::new(456),
                    Decimal::from(10),
                    in_ten_days(),
                )
                .unwrap();
            ids.push(payment.payment_id);
        }

        let result = payments.delete_all();
        assert!(matches!(
            result,
            Err(Error::Ledger(bank_core::Error::DeleteNotAllowed))
        ));

        // Every member untouched
        for id in ids {
            assert_eq!(payments.get(id).unwrap().status, PaymentStatus::Pending);
        }
    }

    #[test]
    fn test_recompute_reserved_matches_incremental() {
        let (payments, _temp) = test_service();
        let a = AccountNo::new(123);

        for amount in [100u64, 50, 25] {
            payments
                .schedule(a, AccountNo::new(456), Decimal::from(amount), in_ten_days())
                .unwrap();
        }

        let repaired = payments.ledger().recompute_reserved(a).unwrap();
        assert_eq!(repaired.reserved_amount, Decimal::from(175));
        assert_eq!(
            payments.ledger().account(a).unwrap().reserved_amount,
            Decimal::from(175)
        );
    }

    #[test]
    fn test_schedule_to_missing_account() {
        let (payments, _temp) = test_service();

        let result = payments.schedule(
            AccountNo::new(123),
            AccountNo::new(999),
            Decimal::from(10),
            in_ten_days(),
        );
        assert!(matches!(
            result,
            Err(Error::Ledger(bank_core::Error::AccountNotFound(_)))
        ));
        assert_eq!(
            payments.ledger().account(AccountNo::new(123)).unwrap().reserved_amount,
            Decimal::ZERO
        );
    }

    #[test]
    fn test_due_pending_excludes_future() {
        let (payments, _temp) = test_service();
        let now = Utc::now();

        let due = payments
            .schedule(
                AccountNo::new(123),
                AccountNo::new(456),
                Decimal::from(10),
                now - Duration::minutes(1),
            )
            .unwrap();
        let future = payments
            .schedule(
                AccountNo::new(123),
                AccountNo::new(456),
                Decimal::from(10),
                now + Duration::days(1),
            )
            .unwrap();

        let ids = payments.due_pending(now).unwrap();
        assert!(ids.contains(&due.payment_id));
        assert!(!ids.contains(&future.payment_id));
    }
}

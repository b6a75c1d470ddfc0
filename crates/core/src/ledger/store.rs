//! Record store port.
//!
//! The ledger service talks to persistence only through these traits. A store
//! hands out [`StoreTransaction`]s that buffer writes, hold exclusive account
//! locks and apply everything atomically on [`StoreTransaction::commit`].
//! Dropping a transaction without committing discards its writes and releases
//! its locks.

use async_trait::async_trait;
use banker_shared::types::{AccountId, LedgerId};
use chrono::{DateTime, Utc};

use super::account::Account;
use super::balance::{Balance, BalanceKey};
use super::error::LedgerError;
use super::period::Ledger;
use super::reservation::Reservation;
use super::transaction::AccountingTransaction;

/// Factory for store transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Starts a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, LedgerError>;
}

/// One unit of work against the record store.
///
/// Reads see the transaction's own buffered writes. Commit checks the
/// optimistic version of every balance, ledger and reservation written or
/// ledger read, and fails with [`LedgerError::ConcurrencyConflict`] if any
/// changed underneath.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    /// Acquires exclusive locks on `accounts`, in the given order.
    ///
    /// Callers pass ids sorted by the global locking order. Locks are held
    /// until commit or drop.
    async fn lock_accounts(&mut self, accounts: &[AccountId]) -> Result<(), LedgerError>;

    /// Looks up an account by its unique reference.
    async fn find_account_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Account>, LedgerError>;

    /// Stages a new account.
    async fn save_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// The ledger whose period contains `instant`.
    async fn find_ledger_at(&self, instant: DateTime<Utc>)
    -> Result<Option<Ledger>, LedgerError>;

    /// The open-ended ledger, if any.
    async fn find_open_ledger(&self) -> Result<Option<Ledger>, LedgerError>;

    /// The ledger that started most recently before `ledger`.
    async fn find_previous_ledger(&self, ledger: &Ledger) -> Result<Option<Ledger>, LedgerError>;

    /// All ledgers, oldest first.
    async fn find_ledgers(&self) -> Result<Vec<Ledger>, LedgerError>;

    /// Stages a new or updated ledger.
    async fn save_ledger(&mut self, ledger: &Ledger) -> Result<(), LedgerError>;

    /// Looks up the balance of one account in one ledger.
    async fn find_balance(&self, key: BalanceKey) -> Result<Option<Balance>, LedgerError>;

    /// Stages a new or updated balance.
    async fn save_balance(&mut self, balance: &Balance) -> Result<(), LedgerError>;

    /// Stages a posted transaction and its entries.
    async fn save_transaction(
        &mut self,
        transaction: &AccountingTransaction,
    ) -> Result<(), LedgerError>;

    /// The latest accounting time of any transaction posted to `ledger_id`.
    async fn find_latest_accounting_time(
        &self,
        ledger_id: LedgerId,
    ) -> Result<Option<DateTime<Utc>>, LedgerError>;

    /// Looks up a reservation by business reference.
    async fn find_reservation(
        &self,
        business_reference: &str,
    ) -> Result<Option<Reservation>, LedgerError>;

    /// Stages a new or updated reservation.
    async fn save_reservation(&mut self, reservation: &Reservation) -> Result<(), LedgerError>;

    /// Applies every staged write atomically and releases all locks.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

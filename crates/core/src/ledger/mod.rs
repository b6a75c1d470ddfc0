//! Double-entry bookkeeping.
//!
//! This module implements the ledger core:
//! - Accounts, ledger periods and per-period balances
//! - Accounting entries and balanced transactions
//! - The fluent transaction builder and its pure form
//! - Deterministic account locking order
//! - Reservations held for later charging
//! - The record store port and the ledger service

pub mod account;
pub mod balance;
pub mod entry;
pub mod error;
pub mod locking;
pub mod period;
pub mod reservation;
pub mod service;
pub mod store;
pub mod transaction;
pub mod validation;

#[cfg(test)]
mod locking_props;
#[cfg(test)]
mod validation_props;

pub use account::{Account, AccountPurpose, AccountType};
pub use balance::{Balance, BalanceKey};
pub use entry::{AccountingEntry, EntryType};
pub use error::{ErrorKind, LedgerError};
pub use locking::{LockKey, SystemAccountRefs, sort_accounts_for_locking};
pub use period::Ledger;
pub use reservation::{Reservation, ReservationStatus};
pub use service::{LedgerService, SystemAccounts};
pub use store::{LedgerStore, StoreTransaction};
pub use transaction::{
    AccountingTransaction, BalanceDelta, EntryLine, PreparedTransaction, TransactionBuilder,
    TransactionDraft, build_transaction,
};
pub use validation::{MIN_ENTRIES, TransactionTotals, validate_entries};

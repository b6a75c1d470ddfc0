//! Ledger error types.
//!
//! This module defines all errors that can occur during ledger operations:
//! validation errors, lookup failures, business rule rejections, store
//! conflicts and system failures. Every variant carries enough context
//! (reference, amount, ledger period) for the caller to log and decide on a
//! compensating action.

use banker_shared::AppError;
use banker_shared::types::{LedgerId, Money, MoneyError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Broad classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, reported before any mutation.
    Validation,
    /// A referenced account, ledger or reservation does not exist.
    NotFound,
    /// A business rule rejected the operation.
    Business,
    /// Lock or version conflict in the store. Retryable by the caller.
    Conflict,
    /// Store or internal failure.
    System,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Entry amounts must be strictly positive.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    /// Account reference is empty or whitespace.
    #[error("Account reference must not be blank")]
    BlankReference,

    /// Another account already uses this reference.
    #[error("Account reference already in use: {0}")]
    DuplicateReference(String),

    /// The reference belongs to a configured system account.
    #[error("Account reference {0} is reserved for a system account")]
    ReservedReference(String),

    /// An existing account under a system reference has the wrong shape.
    #[error("Account {reference} ({account_type}/{purpose}) cannot serve as a system account")]
    SystemAccountMismatch {
        /// Account reference.
        reference: String,
        /// Type code of the existing account.
        account_type: &'static str,
        /// Purpose code of the existing account.
        purpose: &'static str,
    },

    /// Transaction must have at least 2 entries.
    #[error("Transaction must have at least 2 entries, got {count}")]
    InsufficientEntries {
        /// Number of entries supplied.
        count: usize,
    },

    /// Transaction is not balanced (debits != credits).
    #[error("Transaction is not balanced. Debit: {debit}, Credit: {credit}")]
    UnbalancedTransaction {
        /// Total debit amount.
        debit: Money,
        /// Total credit amount.
        credit: Money,
    },

    /// The accounting time does not fall inside the ledger's period.
    #[error("Accounting time {accounting_time} is outside ledger {ledger}")]
    AccountingTimeOutsidePeriod {
        /// Ledger name.
        ledger: String,
        /// The offending instant.
        accounting_time: DateTime<Utc>,
    },

    /// A balance from another ledger was passed to a transaction builder.
    #[error("Balance belongs to ledger {actual}, transaction posts to ledger {expected}")]
    BalanceLedgerMismatch {
        /// Ledger of the transaction.
        expected: LedgerId,
        /// Ledger of the balance.
        actual: LedgerId,
    },

    /// Source and destination of a transfer are the same account.
    #[error("Cannot transfer from account {0} to itself")]
    SameAccountTransfer(String),

    /// A ledger period boundary is invalid.
    #[error("Invalid ledger period for {ledger}: {reason}")]
    InvalidPeriod {
        /// Ledger name.
        ledger: String,
        /// What is wrong with the boundary.
        reason: String,
    },

    /// The first ledger can only be opened once.
    #[error("A ledger already exists: {0}")]
    LedgerAlreadyExists(String),

    /// A reservation with this business reference already exists.
    #[error("Reservation already exists for {0}")]
    DuplicateReservation(String),

    /// An enum code at the serialization boundary is not recognized.
    #[error("Unknown {kind} code: {code}")]
    UnknownCode {
        /// The enum being decoded.
        kind: &'static str,
        /// The offending code.
        code: String,
    },

    /// Money arithmetic overflowed.
    #[error(transparent)]
    MoneyOverflow(#[from] MoneyError),

    // ========== Not Found Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// No ledger covers the given instant.
    #[error("No ledger covers {0}")]
    NoLedgerForInstant(DateTime<Utc>),

    /// No open-ended ledger exists.
    #[error("No open ledger")]
    NoOpenLedger,

    /// No reservation exists for the business reference.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    // ========== Business Rule Errors ==========
    /// Posting would drive a non-overdraft-eligible balance negative.
    #[error(
        "Account {account} would be overdrawn in ledger {ledger}: balance {balance}, amount {amount}"
    )]
    Overdrawn {
        /// Account reference.
        account: String,
        /// Ledger name.
        ledger: String,
        /// Balance before the posting.
        balance: Money,
        /// Amount of the rejected posting.
        amount: Money,
    },

    /// A charge exceeds what is still held by the reservation.
    #[error("Charge of {requested} for {business_reference} exceeds reserved amount {reserved}")]
    InvalidCharge {
        /// Business reference of the reservation.
        business_reference: String,
        /// Requested charge.
        requested: Money,
        /// Amount still held.
        reserved: Money,
    },

    /// The ledger covering the accounting time is closed for posting.
    #[error("Ledger {0} is closed, no posting allowed")]
    PeriodClosed(String),

    // ========== Concurrency Errors ==========
    /// Version check failed at commit.
    #[error("Concurrent modification of {record}, please retry")]
    ConcurrencyConflict {
        /// Description of the conflicting record.
        record: String,
    },

    /// An account lock could not be acquired in time.
    #[error("Timed out waiting for lock on account {0}, please retry")]
    LockTimeout(String),

    // ========== System Errors ==========
    /// Record store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NonPositiveAmount(_)
            | Self::BlankReference
            | Self::DuplicateReference(_)
            | Self::ReservedReference(_)
            | Self::SystemAccountMismatch { .. }
            | Self::InsufficientEntries { .. }
            | Self::UnbalancedTransaction { .. }
            | Self::AccountingTimeOutsidePeriod { .. }
            | Self::BalanceLedgerMismatch { .. }
            | Self::SameAccountTransfer(_)
            | Self::InvalidPeriod { .. }
            | Self::LedgerAlreadyExists(_)
            | Self::DuplicateReservation(_)
            | Self::UnknownCode { .. }
            | Self::MoneyOverflow(_) => ErrorKind::Validation,

            Self::AccountNotFound(_)
            | Self::NoLedgerForInstant(_)
            | Self::NoOpenLedger
            | Self::ReservationNotFound(_) => ErrorKind::NotFound,

            Self::Overdrawn { .. } | Self::InvalidCharge { .. } | Self::PeriodClosed(_) => {
                ErrorKind::Business
            }

            Self::ConcurrencyConflict { .. } | Self::LockTimeout(_) => ErrorKind::Conflict,

            Self::Store(_) | Self::Internal(_) => ErrorKind::System,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::BlankReference => "BLANK_REFERENCE",
            Self::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            Self::ReservedReference(_) => "RESERVED_REFERENCE",
            Self::SystemAccountMismatch { .. } => "SYSTEM_ACCOUNT_MISMATCH",
            Self::InsufficientEntries { .. } => "INSUFFICIENT_ENTRIES",
            Self::UnbalancedTransaction { .. } => "UNBALANCED_TRANSACTION",
            Self::AccountingTimeOutsidePeriod { .. } => "ACCOUNTING_TIME_OUTSIDE_PERIOD",
            Self::BalanceLedgerMismatch { .. } => "BALANCE_LEDGER_MISMATCH",
            Self::SameAccountTransfer(_) => "SAME_ACCOUNT_TRANSFER",
            Self::InvalidPeriod { .. } => "INVALID_PERIOD",
            Self::LedgerAlreadyExists(_) => "LEDGER_ALREADY_EXISTS",
            Self::DuplicateReservation(_) => "DUPLICATE_RESERVATION",
            Self::UnknownCode { .. } => "UNKNOWN_CODE",
            Self::MoneyOverflow(_) => "ARITHMETIC_OVERFLOW",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::NoLedgerForInstant(_) => "NO_LEDGER_FOR_INSTANT",
            Self::NoOpenLedger => "NO_OPEN_LEDGER",
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            Self::Overdrawn { .. } => "OVERDRAWN",
            Self::InvalidCharge { .. } => "INVALID_CHARGE",
            Self::PeriodClosed(_) => "PERIOD_CLOSED",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Business => Self::BusinessRule(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::System => match err {
                LedgerError::Store(_) => Self::Database(message),
                _ => Self::Internal(message),
            },
        }
    }
}

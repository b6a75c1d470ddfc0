//! Business rule validation for accounting transactions.

use banker_shared::types::Money;

use super::entry::EntryType;
use super::error::LedgerError;
use super::transaction::EntryLine;

/// Minimum number of entries in a double-entry transaction.
pub const MIN_ENTRIES: usize = 2;

/// Sum of debits and credits of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionTotals {
    /// Total debit amount.
    pub debit: Money,
    /// Total credit amount.
    pub credit: Money,
}

impl TransactionTotals {
    /// Returns true if debits equal credits.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }
}

/// Validates that a set of entry lines forms a balanced transaction.
///
/// Checks, in order: at least [`MIN_ENTRIES`] lines, every amount strictly
/// positive, totals representable, and total debits equal to total credits.
pub fn validate_entries(lines: &[EntryLine]) -> Result<TransactionTotals, LedgerError> {
    if lines.len() < MIN_ENTRIES {
        return Err(LedgerError::InsufficientEntries { count: lines.len() });
    }

    let mut totals = TransactionTotals {
        debit: Money::ZERO,
        credit: Money::ZERO,
    };

    for line in lines {
        if !line.amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(line.amount));
        }

        match line.entry_type {
            EntryType::Debit => totals.debit = totals.debit.checked_add(line.amount)?,
            EntryType::Credit => totals.credit = totals.credit.checked_add(line.amount)?,
        }
    }

    if !totals.is_balanced() {
        return Err(LedgerError::UnbalancedTransaction {
            debit: totals.debit,
            credit: totals.credit,
        });
    }

    Ok(totals)
}

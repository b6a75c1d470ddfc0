//! Accounting entry domain types.

use banker_shared::types::{AccountId, EntryId, Money, MoneyError};
use serde::{Deserialize, Serialize};

use super::account::AccountType;
use super::balance::BalanceKey;
use super::error::LedgerError;

/// Type of accounting entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Debit entry (increases assets, decreases liabilities).
    Debit,
    /// Credit entry (decreases assets, increases liabilities).
    Credit,
}

impl EntryType {
    /// Signed change of the balance end amount for an entry of `amount`
    /// against an account of `account_type`.
    pub fn effect(self, account_type: AccountType, amount: Money) -> Result<Money, MoneyError> {
        match (self, account_type) {
            (Self::Debit, AccountType::Asset) | (Self::Credit, AccountType::Liability) => {
                Ok(amount)
            }
            (Self::Credit, AccountType::Asset) | (Self::Debit, AccountType::Liability) => {
                amount.checked_neg()
            }
        }
    }

    /// Persistence code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Debit => "D",
            Self::Credit => "C",
        }
    }

    /// Parses a persistence code.
    pub fn from_code(code: &str) -> Result<Self, LedgerError> {
        match code {
            "D" => Ok(Self::Debit),
            "C" => Ok(Self::Credit),
            _ => Err(LedgerError::UnknownCode {
                kind: "entry type",
                code: code.to_string(),
            }),
        }
    }
}

/// One leg of an accounting transaction against one balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingEntry {
    /// Unique identifier for this entry.
    pub id: EntryId,
    /// The balance this entry posts against.
    pub balance: BalanceKey,
    /// The account affected by this entry.
    pub account_id: AccountId,
    /// Sign convention of the account, captured at posting time.
    pub account_type: AccountType,
    /// Whether this is a debit or credit.
    pub entry_type: EntryType,
    /// Strictly positive amount.
    pub amount: Money,
}

impl AccountingEntry {
    /// Signed change this entry makes to its balance's end amount.
    pub fn balance_effect(&self) -> Result<Money, MoneyError> {
        self.entry_type.effect(self.account_type, self.amount)
    }
}

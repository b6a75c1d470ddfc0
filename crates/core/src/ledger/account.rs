//! Ledger accounts.
//!
//! An account is created once and never changes its reference or type.
//! Accounts are never deleted; their history lives on in balances.

use banker_shared::types::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// Account type, deciding the sign convention of debits and credits.
///
/// - Asset: debit increases, credit decreases
/// - Liability: credit increases, debit decreases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Debit-normal account, e.g. the banking reserve.
    Asset,
    /// Credit-normal account, e.g. a user's current account.
    Liability,
}

impl AccountType {
    /// Persistence code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Asset => "A",
            Self::Liability => "L",
        }
    }

    /// Parses a persistence code.
    pub fn from_code(code: &str) -> Result<Self, LedgerError> {
        match code {
            "A" => Ok(Self::Asset),
            "L" => Ok(Self::Liability),
            _ => Err(LedgerError::UnknownCode {
                kind: "account type",
                code: code.to_string(),
            }),
        }
    }
}

/// Account purpose, used for locking order and overdraft policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountPurpose {
    /// Well-known accounts owned by the bank itself.
    System,
    /// A user's current account.
    Current,
    /// A user's premium (reward) account.
    Premium,
}

impl AccountPurpose {
    /// Rank in the global locking order. System accounts lock first.
    #[must_use]
    pub const fn lock_rank(self) -> u8 {
        match self {
            Self::System => 0,
            Self::Current => 1,
            Self::Premium => 2,
        }
    }

    /// Whether a liability account with this purpose may go below zero.
    #[must_use]
    pub const fn allows_overdraft(self) -> bool {
        matches!(self, Self::System)
    }

    /// Persistence code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::System => "SYS",
            Self::Current => "CUR",
            Self::Premium => "PRE",
        }
    }

    /// Parses a persistence code.
    pub fn from_code(code: &str) -> Result<Self, LedgerError> {
        match code {
            "SYS" => Ok(Self::System),
            "CUR" => Ok(Self::Current),
            "PRE" => Ok(Self::Premium),
            _ => Err(LedgerError::UnknownCode {
                kind: "account purpose",
                code: code.to_string(),
            }),
        }
    }
}

/// A named ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Unique external-facing key, e.g. "bank" or "user1".
    pub reference: String,
    /// Display label.
    pub name: String,
    /// Sign convention.
    pub account_type: AccountType,
    /// Classification for locking order and overdraft policy.
    pub purpose: AccountPurpose,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new, unpersisted account.
    ///
    /// The reference is trimmed. Uniqueness is checked by the store on commit.
    pub fn new_instance(
        reference: &str,
        name: &str,
        account_type: AccountType,
        purpose: AccountPurpose,
    ) -> Result<Self, LedgerError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LedgerError::BlankReference);
        }

        Ok(Self {
            id: AccountId::new(),
            reference: reference.to_string(),
            name: name.to_string(),
            account_type,
            purpose,
            created_at: Utc::now(),
        })
    }
}

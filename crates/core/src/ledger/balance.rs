//! Per-ledger running balances.
//!
//! One balance exists per (ledger, account) pair. It is created lazily the
//! first time the account is touched within the ledger period and is never
//! deleted.

use banker_shared::types::{AccountId, LedgerId, Money, MoneyError};
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountPurpose, AccountType};
use super::period::Ledger;

/// Composite identity of a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// The ledger period.
    pub ledger_id: LedgerId,
    /// The account.
    pub account_id: AccountId,
}

/// Running total for one account within one ledger period.
///
/// `start_amount` never changes after creation. `end_amount` changes only
/// when a prepared transaction is applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    key: BalanceKey,
    account_reference: String,
    account_type: AccountType,
    purpose: AccountPurpose,
    start_amount: Money,
    end_amount: Money,
    version: u64,
}

impl Balance {
    /// Creates a balance with `end_amount == start_amount`.
    #[must_use]
    pub fn new(ledger: &Ledger, account: &Account, start_amount: Money) -> Self {
        Self {
            key: BalanceKey {
                ledger_id: ledger.id(),
                account_id: account.id,
            },
            account_reference: account.reference.clone(),
            account_type: account.account_type,
            purpose: account.purpose,
            start_amount,
            end_amount: start_amount,
            version: 0,
        }
    }

    /// Composite identity.
    #[must_use]
    pub fn key(&self) -> BalanceKey {
        self.key
    }

    /// Ledger this balance belongs to.
    #[must_use]
    pub fn ledger_id(&self) -> LedgerId {
        self.key.ledger_id
    }

    /// Account this balance belongs to.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.key.account_id
    }

    /// Reference of the owning account.
    #[must_use]
    pub fn account_reference(&self) -> &str {
        &self.account_reference
    }

    /// Sign convention of the owning account.
    #[must_use]
    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// Purpose of the owning account.
    #[must_use]
    pub fn purpose(&self) -> AccountPurpose {
        self.purpose
    }

    /// Amount carried over from the previous ledger.
    #[must_use]
    pub fn start_amount(&self) -> Money {
        self.start_amount
    }

    /// Current running total.
    #[must_use]
    pub fn end_amount(&self) -> Money {
        self.end_amount
    }

    /// Optimistic concurrency version, bumped by the store on each commit.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true if this balance may not go below zero.
    #[must_use]
    pub fn is_overdraft_protected(&self) -> bool {
        self.account_type == AccountType::Liability && !self.purpose.allows_overdraft()
    }

    /// The end amount after applying `delta`, without mutating.
    pub fn projected(&self, delta: Money) -> Result<Money, MoneyError> {
        self.end_amount.checked_add(delta)
    }

    pub(crate) fn set_end_amount(&mut self, end_amount: Money) {
        self.end_amount = end_amount;
    }

    /// The record as it looks after a successful store commit.
    #[must_use]
    pub fn committed(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}

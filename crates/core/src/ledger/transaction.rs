//! Accounting transactions and the fluent builder that creates them.
//!
//! Building is split in two steps. [`build_transaction`] is pure: it
//! validates a draft and returns the immutable transaction together with the
//! balance deltas it implies. [`PreparedTransaction::apply`] then mutates the
//! affected balances, all or nothing. [`TransactionBuilder::post`] runs both.

use std::collections::BTreeMap;

use banker_shared::types::{EntryId, LedgerId, Money, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountType;
use super::balance::{Balance, BalanceKey};
use super::entry::{AccountingEntry, EntryType};
use super::error::LedgerError;
use super::validation::{TransactionTotals, validate_entries};

/// An immutable, balanced set of at least two entries.
///
/// Never edited once built; corrections are new offsetting transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingTransaction {
    id: TransactionId,
    ledger_id: LedgerId,
    description: String,
    accounting_time: DateTime<Utc>,
    transaction_time: DateTime<Utc>,
    entries: Vec<AccountingEntry>,
    total: Money,
}

impl AccountingTransaction {
    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Ledger the entries post into.
    #[must_use]
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Business-effective instant.
    #[must_use]
    pub fn accounting_time(&self) -> DateTime<Utc> {
        self.accounting_time
    }

    /// Wall-clock instant of entry.
    #[must_use]
    pub fn transaction_time(&self) -> DateTime<Utc> {
        self.transaction_time
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[AccountingEntry] {
        &self.entries
    }

    /// Total of the debit entries. Equal to [`Self::total_credits`].
    #[must_use]
    pub fn total_debits(&self) -> Money {
        self.total
    }

    /// Total of the credit entries. Equal to [`Self::total_debits`].
    #[must_use]
    pub fn total_credits(&self) -> Money {
        self.total
    }
}

/// One requested leg of a transaction, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLine {
    /// Balance to post against.
    pub balance: BalanceKey,
    /// Sign convention of the balance's account.
    pub account_type: AccountType,
    /// Debit or credit.
    pub entry_type: EntryType,
    /// Amount; must be strictly positive.
    pub amount: Money,
}

/// Everything needed to build a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    /// Ledger the transaction posts into.
    pub ledger_id: LedgerId,
    /// Free-form description.
    pub description: String,
    /// Business-effective instant.
    pub accounting_time: DateTime<Utc>,
    /// Wall-clock instant of entry.
    pub transaction_time: DateTime<Utc>,
    /// Entry lines in insertion order.
    pub lines: Vec<EntryLine>,
}

/// Net change of one balance's end amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    /// The balance to change.
    pub balance: BalanceKey,
    /// Signed change of the end amount.
    pub amount: Money,
}

/// A validated transaction whose balance deltas have not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    transaction: AccountingTransaction,
    deltas: Vec<BalanceDelta>,
}

impl PreparedTransaction {
    /// The transaction that will be recorded.
    #[must_use]
    pub fn transaction(&self) -> &AccountingTransaction {
        &self.transaction
    }

    /// One delta per touched balance, ordered by balance key.
    #[must_use]
    pub fn deltas(&self) -> &[BalanceDelta] {
        &self.deltas
    }

    /// Net change for `key`, zero if the transaction does not touch it.
    #[must_use]
    pub fn delta_for(&self, key: BalanceKey) -> Money {
        self.deltas
            .iter()
            .find(|delta| delta.balance == key)
            .map_or(Money::ZERO, |delta| delta.amount)
    }

    /// Applies every delta to the matching balance in `balances`.
    ///
    /// All new end amounts are computed first; if any balance is missing or
    /// any amount overflows, no balance is changed.
    pub fn apply(self, balances: &mut [Balance]) -> Result<AccountingTransaction, LedgerError> {
        let mut updates = Vec::with_capacity(self.deltas.len());
        for delta in &self.deltas {
            let index = balances
                .iter()
                .position(|balance| balance.key() == delta.balance)
                .ok_or_else(|| {
                    LedgerError::Internal(format!(
                        "balance for account {} in ledger {} not loaded",
                        delta.balance.account_id, delta.balance.ledger_id
                    ))
                })?;
            updates.push((index, balances[index].projected(delta.amount)?));
        }

        for (index, end_amount) in updates {
            balances[index].set_end_amount(end_amount);
        }

        Ok(self.transaction)
    }
}

/// Validates `draft` and computes its balance deltas without side effects.
pub fn build_transaction(draft: TransactionDraft) -> Result<PreparedTransaction, LedgerError> {
    if let Some(line) = draft
        .lines
        .iter()
        .find(|line| line.balance.ledger_id != draft.ledger_id)
    {
        return Err(LedgerError::BalanceLedgerMismatch {
            expected: draft.ledger_id,
            actual: line.balance.ledger_id,
        });
    }

    let TransactionTotals { debit, .. } = validate_entries(&draft.lines)?;

    let mut net: BTreeMap<BalanceKey, Money> = BTreeMap::new();
    for line in &draft.lines {
        let effect = line.entry_type.effect(line.account_type, line.amount)?;
        let slot = net.entry(line.balance).or_insert(Money::ZERO);
        *slot = slot.checked_add(effect)?;
    }

    let deltas = net
        .into_iter()
        .map(|(balance, amount)| BalanceDelta { balance, amount })
        .collect();

    let entries = draft
        .lines
        .into_iter()
        .map(|line| AccountingEntry {
            id: EntryId::new(),
            balance: line.balance,
            account_id: line.balance.account_id,
            account_type: line.account_type,
            entry_type: line.entry_type,
            amount: line.amount,
        })
        .collect();

    Ok(PreparedTransaction {
        transaction: AccountingTransaction {
            id: TransactionId::new(),
            ledger_id: draft.ledger_id,
            description: draft.description,
            accounting_time: draft.accounting_time,
            transaction_time: draft.transaction_time,
            entries,
            total: debit,
        },
        deltas,
    })
}

/// Fluent, single-use builder for an [`AccountingTransaction`].
///
/// Every method consumes the builder. A failed call drops it, so nothing can
/// be added after an error or after `build`.
#[derive(Debug)]
#[must_use = "a transaction builder does nothing until built"]
pub struct TransactionBuilder {
    draft: TransactionDraft,
}

impl TransactionBuilder {
    pub(crate) fn new(
        ledger_id: LedgerId,
        description: String,
        accounting_time: DateTime<Utc>,
        transaction_time: DateTime<Utc>,
    ) -> Self {
        Self {
            draft: TransactionDraft {
                ledger_id,
                description,
                accounting_time,
                transaction_time,
                lines: Vec::new(),
            },
        }
    }

    /// Appends a debit of `amount` against `balance`.
    pub fn debit(self, balance: &Balance, amount: Money) -> Result<Self, LedgerError> {
        self.push(EntryType::Debit, balance, amount)
    }

    /// Appends a credit of `amount` against `balance`.
    pub fn credit(self, balance: &Balance, amount: Money) -> Result<Self, LedgerError> {
        self.push(EntryType::Credit, balance, amount)
    }

    /// Validates the transaction and returns it with its pending deltas.
    pub fn build(self) -> Result<PreparedTransaction, LedgerError> {
        build_transaction(self.draft)
    }

    /// Builds the transaction and applies it to `balances`.
    pub fn post(self, balances: &mut [Balance]) -> Result<AccountingTransaction, LedgerError> {
        self.build()?.apply(balances)
    }

    fn push(
        mut self,
        entry_type: EntryType,
        balance: &Balance,
        amount: Money,
    ) -> Result<Self, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if balance.ledger_id() != self.draft.ledger_id {
            return Err(LedgerError::BalanceLedgerMismatch {
                expected: self.draft.ledger_id,
                actual: balance.ledger_id(),
            });
        }
        self.draft.lines.push(EntryLine {
            balance: balance.key(),
            account_type: balance.account_type(),
            entry_type,
            amount,
        });
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::{Account, AccountPurpose};
    use crate::ledger::period::Ledger;
    use chrono::TimeZone;

    struct Fixture {
        ledger: Ledger,
        bank: Balance,
        user1: Balance,
        user2: Balance,
    }

    fn fixture() -> Fixture {
        let ledger = Ledger::new("2019", Utc.with_ymd_and_hms(2019, 1, 1, 1, 0, 0).unwrap());
        let bank =
            Account::new_instance("bank", "Bank", AccountType::Asset, AccountPurpose::System)
                .unwrap();
        let user1 =
            Account::new_instance("user1", "U1", AccountType::Liability, AccountPurpose::Current)
                .unwrap();
        let user2 =
            Account::new_instance("user2", "U2", AccountType::Liability, AccountPurpose::Current)
                .unwrap();
        Fixture {
            bank: Balance::new(&ledger, &bank, Money::ZERO),
            user1: Balance::new(&ledger, &user1, Money::new(500)),
            user2: Balance::new(&ledger, &user2, Money::ZERO),
            ledger,
        }
    }

    fn accounting_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_deposit_increases_asset_and_liability() {
        let Fixture {
            ledger, bank, user2, ..
        } = fixture();
        let old_amount = user2.end_amount();
        let mut balances = vec![bank, user2];

        let tx = ledger
            .create_transaction("deposit", accounting_time(), Utc::now())
            .unwrap()
            .debit(&balances[0], Money::new(100))
            .unwrap()
            .credit(&balances[1], Money::new(100))
            .unwrap()
            .post(&mut balances)
            .unwrap();

        assert_eq!(balances[0].end_amount(), Money::new(100));
        assert_eq!(
            balances[1].end_amount().checked_sub(old_amount).unwrap(),
            Money::new(100)
        );
        assert_eq!(tx.total_debits(), tx.total_credits());
        assert_eq!(tx.entries().len(), 2);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let Fixture {
            ledger,
            bank,
            user1,
            user2,
        } = fixture();

        let prepared = ledger
            .create_transaction("split", accounting_time(), Utc::now())
            .unwrap()
            .credit(&user2, Money::new(30))
            .unwrap()
            .debit(&user1, Money::new(100))
            .unwrap()
            .credit(&bank, Money::new(70))
            .unwrap()
            .build()
            .unwrap();

        let types: Vec<EntryType> = prepared
            .transaction()
            .entries()
            .iter()
            .map(|entry| entry.entry_type)
            .collect();
        assert_eq!(
            types,
            vec![EntryType::Credit, EntryType::Debit, EntryType::Credit]
        );
        assert_eq!(prepared.transaction().entries()[1].balance, user1.key());
    }

    #[test]
    fn test_single_entry_fails() {
        let Fixture { ledger, bank, .. } = fixture();
        let result = ledger
            .create_transaction("half", accounting_time(), Utc::now())
            .unwrap()
            .debit(&bank, Money::new(100))
            .unwrap()
            .build();
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientEntries { count: 1 })
        ));
    }

    #[test]
    fn test_unbalanced_leaves_balances_unchanged() {
        let Fixture {
            ledger, user1, user2, ..
        } = fixture();
        let mut balances = vec![user1, user2];
        let before = balances.clone();

        let result = ledger
            .create_transaction("bad", accounting_time(), Utc::now())
            .unwrap()
            .debit(&balances[0], Money::new(100))
            .unwrap()
            .credit(&balances[1], Money::new(90))
            .unwrap()
            .post(&mut balances);

        assert!(matches!(
            result,
            Err(LedgerError::UnbalancedTransaction { .. })
        ));
        assert_eq!(balances, before);
    }

    #[test]
    fn test_non_positive_amount_is_rejected() {
        let Fixture { ledger, bank, .. } = fixture();
        let builder = ledger
            .create_transaction("zero", accounting_time(), Utc::now())
            .unwrap();
        assert!(matches!(
            builder.debit(&bank, Money::ZERO),
            Err(LedgerError::NonPositiveAmount(_))
        ));

        let builder = ledger
            .create_transaction("negative", accounting_time(), Utc::now())
            .unwrap();
        assert!(builder.credit(&bank, Money::new(-5)).is_err());
    }

    #[test]
    fn test_balance_from_other_ledger_is_rejected() {
        let Fixture { ledger, .. } = fixture();
        let other = Ledger::new("2020", Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap());
        let account =
            Account::new_instance("user3", "U3", AccountType::Liability, AccountPurpose::Current)
                .unwrap();
        let foreign = Balance::new(&other, &account, Money::ZERO);

        let result = ledger
            .create_transaction("foreign", accounting_time(), Utc::now())
            .unwrap()
            .debit(&foreign, Money::new(1));
        assert!(matches!(
            result,
            Err(LedgerError::BalanceLedgerMismatch { .. })
        ));
    }

    #[test]
    fn test_same_balance_twice_nets_out() {
        let Fixture { ledger, user1, .. } = fixture();
        let prepared = ledger
            .create_transaction("noop", accounting_time(), Utc::now())
            .unwrap()
            .debit(&user1, Money::new(40))
            .unwrap()
            .credit(&user1, Money::new(40))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(prepared.deltas().len(), 1);
        assert_eq!(prepared.delta_for(user1.key()), Money::ZERO);
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let Fixture {
            ledger, bank, user1, ..
        } = fixture();
        let near_max = Account::new_instance(
            "whale",
            "Whale",
            AccountType::Liability,
            AccountPurpose::Current,
        )
        .unwrap();
        let whale = Balance::new(&ledger, &near_max, Money::new(i64::MAX));

        let prepared = ledger
            .create_transaction("overflow", accounting_time(), Utc::now())
            .unwrap()
            .debit(&bank, Money::new(10))
            .unwrap()
            .credit(&whale, Money::new(10))
            .unwrap()
            .build()
            .unwrap();

        let mut balances = vec![bank, whale, user1];
        let before = balances.clone();
        assert!(matches!(
            prepared.apply(&mut balances),
            Err(LedgerError::MoneyOverflow(_))
        ));
        assert_eq!(balances, before);
    }

    #[test]
    fn test_apply_requires_every_balance() {
        let Fixture {
            ledger, bank, user2, ..
        } = fixture();
        let prepared = ledger
            .create_transaction("deposit", accounting_time(), Utc::now())
            .unwrap()
            .debit(&bank, Money::new(10))
            .unwrap()
            .credit(&user2, Money::new(10))
            .unwrap()
            .build()
            .unwrap();

        let mut only_bank = vec![bank.clone()];
        assert!(matches!(
            prepared.apply(&mut only_bank),
            Err(LedgerError::Internal(_))
        ));
        assert_eq!(only_bank[0], bank);
    }

    #[test]
    fn test_build_transaction_from_draft() {
        let Fixture {
            ledger, user1, user2, ..
        } = fixture();
        let draft = TransactionDraft {
            ledger_id: ledger.id(),
            description: "p2p".to_string(),
            accounting_time: accounting_time(),
            transaction_time: Utc::now(),
            lines: vec![
                EntryLine {
                    balance: user1.key(),
                    account_type: AccountType::Liability,
                    entry_type: EntryType::Debit,
                    amount: Money::new(25),
                },
                EntryLine {
                    balance: user2.key(),
                    account_type: AccountType::Liability,
                    entry_type: EntryType::Credit,
                    amount: Money::new(25),
                },
            ],
        };

        let prepared = build_transaction(draft).unwrap();
        assert_eq!(prepared.delta_for(user1.key()), Money::new(-25));
        assert_eq!(prepared.delta_for(user2.key()), Money::new(25));
        assert_eq!(prepared.transaction().description(), "p2p");
        assert_eq!(prepared.transaction().ledger_id(), ledger.id());
    }
}

//! Property-based tests for entry validation and transaction building.

use banker_shared::types::Money;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use super::account::{Account, AccountPurpose, AccountType};
use super::balance::{Balance, BalanceKey};
use super::entry::EntryType;
use super::error::LedgerError;
use super::period::Ledger;
use super::transaction::EntryLine;
use super::validation::validate_entries;

/// Strategy to generate a valid positive amount (> 0).
fn positive_amount() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

/// Strategy to generate an entry type.
fn entry_type_strategy() -> impl Strategy<Value = EntryType> {
    prop_oneof![Just(EntryType::Debit), Just(EntryType::Credit)]
}

fn account_type_strategy() -> impl Strategy<Value = AccountType> {
    prop_oneof![Just(AccountType::Asset), Just(AccountType::Liability)]
}

fn other_side(entry_type: EntryType) -> EntryType {
    match entry_type {
        EntryType::Debit => EntryType::Credit,
        EntryType::Credit => EntryType::Debit,
    }
}

fn make_line(entry_type: EntryType, amount: i64) -> EntryLine {
    let ledger = Ledger::new("2019", Utc.with_ymd_and_hms(2019, 1, 1, 1, 0, 0).unwrap());
    EntryLine {
        balance: BalanceKey {
            ledger_id: ledger.id(),
            account_id: banker_shared::types::AccountId::new(),
        },
        account_type: AccountType::Liability,
        entry_type,
        amount: Money::new(amount),
    }
}

fn system_balance(ledger: &Ledger, reference: &str, account_type: AccountType) -> Balance {
    let account =
        Account::new_instance(reference, reference, account_type, AccountPurpose::System).unwrap();
    Balance::new(ledger, &account, Money::ZERO)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Zero and negative amounts are rejected whatever the other lines are.
    #[test]
    fn prop_non_positive_amount_rejected(
        entry_type in entry_type_strategy(),
        bad_amount in -100_000_000i64..=0,
        other_amount in positive_amount(),
    ) {
        let lines = vec![
            make_line(entry_type, bad_amount),
            make_line(other_side(entry_type), other_amount),
        ];

        let result = validate_entries(&lines);
        prop_assert!(
            matches!(result, Err(LedgerError::NonPositiveAmount(_))),
            "Non-positive amount should be rejected, got: {:?}",
            result
        );
    }

    /// A single line is never a transaction.
    #[test]
    fn prop_single_line_rejected(
        entry_type in entry_type_strategy(),
        amount in positive_amount(),
    ) {
        let result = validate_entries(&[make_line(entry_type, amount)]);
        prop_assert!(
            matches!(result, Err(LedgerError::InsufficientEntries { count: 1 })),
            "Single line should be rejected, got: {:?}",
            result
        );
    }

    /// Splitting a debit over any number of credits stays balanced.
    #[test]
    fn prop_split_credits_balance(
        parts in prop::collection::vec(positive_amount(), 1..8),
    ) {
        let total: i64 = parts.iter().sum();
        let mut lines = vec![make_line(EntryType::Debit, total)];
        lines.extend(parts.iter().map(|&amount| make_line(EntryType::Credit, amount)));

        let totals = validate_entries(&lines).unwrap();
        prop_assert!(totals.is_balanced());
        prop_assert_eq!(totals.debit, Money::new(total));
    }

    /// Any difference between debits and credits is reported as unbalanced.
    #[test]
    fn prop_unbalanced_rejected(
        debit in positive_amount(),
        credit in positive_amount(),
    ) {
        prop_assume!(debit != credit);
        let lines = vec![
            make_line(EntryType::Debit, debit),
            make_line(EntryType::Credit, credit),
        ];

        let is_unbalanced = matches!(
            validate_entries(&lines),
            Err(LedgerError::UnbalancedTransaction { .. })
        );
        prop_assert!(is_unbalanced);
    }

    /// Posting a balanced transaction keeps debits equal to credits and
    /// moves every balance by exactly its entry's effect.
    #[test]
    fn prop_posted_transaction_is_balanced(
        amount in positive_amount(),
        from_type in account_type_strategy(),
        to_type in account_type_strategy(),
    ) {
        let ledger = Ledger::new("2019", Utc.with_ymd_and_hms(2019, 1, 1, 1, 0, 0).unwrap());
        let mut balances = vec![
            system_balance(&ledger, "from", from_type),
            system_balance(&ledger, "to", to_type),
        ];
        let amount = Money::new(amount);

        let tx = ledger
            .create_transaction("prop", ledger.start_period(), Utc::now())
            .unwrap()
            .debit(&balances[0], amount)
            .unwrap()
            .credit(&balances[1], amount)
            .unwrap()
            .post(&mut balances)
            .unwrap();

        prop_assert_eq!(tx.total_debits(), tx.total_credits());
        prop_assert_eq!(
            balances[0].end_amount(),
            EntryType::Debit.effect(from_type, amount).unwrap()
        );
        prop_assert_eq!(
            balances[1].end_amount(),
            EntryType::Credit.effect(to_type, amount).unwrap()
        );
    }

    /// A rejected transaction never touches the balances.
    #[test]
    fn prop_rejected_transaction_leaves_balances_unchanged(
        debit in positive_amount(),
        credit in positive_amount(),
    ) {
        prop_assume!(debit != credit);
        let ledger = Ledger::new("2019", Utc.with_ymd_and_hms(2019, 1, 1, 1, 0, 0).unwrap());
        let mut balances = vec![
            system_balance(&ledger, "bank", AccountType::Asset),
            system_balance(&ledger, "reservations", AccountType::Liability),
        ];
        let before = balances.clone();

        let result = ledger
            .create_transaction("prop", ledger.start_period(), Utc::now())
            .unwrap()
            .debit(&balances[0], Money::new(debit))
            .unwrap()
            .credit(&balances[1], Money::new(credit))
            .unwrap()
            .post(&mut balances);

        prop_assert!(result.is_err());
        prop_assert_eq!(balances, before);
    }
}

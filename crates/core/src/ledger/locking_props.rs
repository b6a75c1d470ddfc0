//! Property-based tests for the account locking order.

use proptest::prelude::*;

use super::account::{Account, AccountPurpose, AccountType};
use super::locking::{SystemAccountRefs, sort_accounts_for_locking};

fn purpose_strategy() -> impl Strategy<Value = AccountPurpose> {
    prop_oneof![
        Just(AccountPurpose::System),
        Just(AccountPurpose::Current),
        Just(AccountPurpose::Premium),
    ]
}

/// Accounts with unique references, some of them the well-known ones.
fn accounts_strategy() -> impl Strategy<Value = Vec<Account>> {
    let reference = prop_oneof![
        Just("bank".to_string()),
        Just("reservations".to_string()),
        Just("premiums".to_string()),
        "[a-z]{1,6}[0-9]{0,2}",
    ];
    prop::collection::hash_set(reference, 0..12).prop_flat_map(|references| {
        let references: Vec<String> = references.into_iter().collect();
        let len = references.len();
        prop::collection::vec(purpose_strategy(), len).prop_map(move |purposes| {
            references
                .iter()
                .zip(purposes)
                .map(|(reference, purpose)| {
                    Account::new_instance(reference, reference, AccountType::Liability, purpose)
                        .unwrap()
                })
                .collect()
        })
    })
}

fn ids(accounts: &[Account]) -> Vec<banker_shared::types::AccountId> {
    accounts.iter().map(|a| a.id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Sorting an already sorted slice changes nothing.
    #[test]
    fn prop_sort_is_idempotent(mut accounts in accounts_strategy()) {
        let refs = SystemAccountRefs::default();
        sort_accounts_for_locking(&mut accounts, &refs);
        let once = ids(&accounts);
        sort_accounts_for_locking(&mut accounts, &refs);
        prop_assert_eq!(ids(&accounts), once);
    }

    /// The result does not depend on the input order.
    #[test]
    fn prop_sort_is_total(accounts in accounts_strategy()) {
        let refs = SystemAccountRefs::default();
        let mut forward = accounts.clone();
        let mut backward: Vec<Account> = accounts.into_iter().rev().collect();

        sort_accounts_for_locking(&mut forward, &refs);
        sort_accounts_for_locking(&mut backward, &refs);

        prop_assert_eq!(ids(&forward), ids(&backward));
    }

    /// Purpose ranks never decrease along the sorted slice.
    #[test]
    fn prop_system_accounts_lock_first(mut accounts in accounts_strategy()) {
        sort_accounts_for_locking(&mut accounts, &SystemAccountRefs::default());
        for pair in accounts.windows(2) {
            prop_assert!(pair[0].purpose.lock_rank() <= pair[1].purpose.lock_rank());
        }
    }
}

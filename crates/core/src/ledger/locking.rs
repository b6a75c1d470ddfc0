//! Deterministic account locking order.
//!
//! Every operation that touches several accounts locks them in the order
//! produced here, so two operations over intersecting account sets can never
//! wait on each other in a cycle.

use std::borrow::Borrow;

use banker_shared::LedgerConfig;
use banker_shared::types::AccountId;

use super::account::{Account, AccountPurpose};

/// References of the well-known system accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAccountRefs {
    /// The bank's own reserve (asset) account.
    pub banking_reserve: String,
    /// Holds reserved amounts until they are charged or released.
    pub reservations: String,
    /// Funds premium (reward) payouts.
    pub premiums: String,
}

impl SystemAccountRefs {
    /// Ordering rank among system accounts. Unknown references rank last.
    #[must_use]
    pub fn rank(&self, reference: &str) -> u8 {
        if reference == self.banking_reserve {
            0
        } else if reference == self.reservations {
            1
        } else if reference == self.premiums {
            2
        } else {
            3
        }
    }

    /// Returns true if `reference` names one of the configured system accounts.
    #[must_use]
    pub fn is_system_reference(&self, reference: &str) -> bool {
        self.rank(reference) < 3
    }
}

impl Default for SystemAccountRefs {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for SystemAccountRefs {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            banking_reserve: config.banking_reserve_reference.clone(),
            reservations: config.reservations_reference.clone(),
            premiums: config.premiums_reference.clone(),
        }
    }
}

/// Position of an account in the global locking order.
///
/// Compared field by field: purpose rank, system sub-rank, reference, id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockKey<'a> {
    purpose_rank: u8,
    system_rank: u8,
    reference: &'a str,
    id: AccountId,
}

impl Account {
    /// This account's position in the global locking order.
    #[must_use]
    pub fn lock_key<'a>(&'a self, refs: &SystemAccountRefs) -> LockKey<'a> {
        let system_rank = match self.purpose {
            AccountPurpose::System => refs.rank(&self.reference),
            AccountPurpose::Current | AccountPurpose::Premium => 0,
        };
        LockKey {
            purpose_rank: self.purpose.lock_rank(),
            system_rank,
            reference: &self.reference,
            id: self.id,
        }
    }
}

/// Sorts `accounts` in place into locking order.
///
/// Works on owned accounts as well as on borrowed ones.
pub fn sort_accounts_for_locking<A: Borrow<Account>>(
    accounts: &mut [A],
    refs: &SystemAccountRefs,
) {
    accounts.sort_by(|a, b| {
        let (a, b): (&Account, &Account) = (a.borrow(), b.borrow());
        a.lock_key(refs).cmp(&b.lock_key(refs))
    });
}

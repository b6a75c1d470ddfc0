//! In-memory record store.
//!
//! Committed records live in plain maps behind one mutex. A transaction
//! stages its writes locally, overlays them on reads and publishes them in a
//! single critical section on commit, after checking versions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use banker_core::ledger::{
    Account, AccountingTransaction, Balance, BalanceKey, Ledger, LedgerError, LedgerStore,
    Reservation, StoreTransaction,
};
use banker_shared::StoreConfig;
use banker_shared::types::{AccountId, LedgerId};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::locks::{AccountGuard, AccountLocks};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    ledgers: HashMap<LedgerId, Ledger>,
    balances: HashMap<BalanceKey, Balance>,
    transactions: Vec<AccountingTransaction>,
    reservations: HashMap<String, Reservation>,
}

#[derive(Debug)]
struct Inner {
    tables: Mutex<Tables>,
    locks: AccountLocks,
}

impl Inner {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, LedgerError> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::Store("record tables poisoned".to_string()))
    }
}

/// Record store kept entirely in memory.
///
/// Cloning yields another handle to the same records and locks.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                locks: AccountLocks::new(config.lock_timeout()),
            }),
        }
    }

    /// Every committed balance.
    pub fn balances(&self) -> Result<Vec<Balance>, LedgerError> {
        Ok(self.inner.tables()?.balances.values().cloned().collect())
    }

    /// Every committed transaction, in commit order.
    pub fn transactions(&self) -> Result<Vec<AccountingTransaction>, LedgerError> {
        Ok(self.inner.tables()?.transactions.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, LedgerError> {
        Ok(Box::new(MemoryTransaction::new(Arc::clone(&self.inner))))
    }
}

/// Unit of work against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    guards: Vec<(AccountId, AccountGuard)>,
    accounts: Vec<Account>,
    ledgers: HashMap<LedgerId, Ledger>,
    balances: HashMap<BalanceKey, Balance>,
    transactions: Vec<AccountingTransaction>,
    reservations: HashMap<String, Reservation>,
    ledger_reads: Mutex<HashMap<LedgerId, u64>>,
}

impl MemoryTransaction {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            guards: Vec::new(),
            accounts: Vec::new(),
            ledgers: HashMap::new(),
            balances: HashMap::new(),
            transactions: Vec::new(),
            reservations: HashMap::new(),
            ledger_reads: Mutex::new(HashMap::new()),
        }
    }

    /// Committed ledgers overlaid with staged ones, oldest first.
    fn ledger_view(&self) -> Result<Vec<Ledger>, LedgerError> {
        let mut view: HashMap<LedgerId, Ledger> = self.inner.tables()?.ledgers.clone();
        view.extend(self.ledgers.iter().map(|(id, ledger)| (*id, ledger.clone())));

        let mut ledgers: Vec<Ledger> = view.into_values().collect();
        ledgers.sort_by_key(Ledger::start_period);
        Ok(ledgers)
    }

    /// Remembers the version of a ledger this transaction relied on.
    fn track(&self, ledger: Option<Ledger>) -> Result<Option<Ledger>, LedgerError> {
        if let Some(ledger) = &ledger {
            self.ledger_reads
                .lock()
                .map_err(|_| LedgerError::Store("ledger read set poisoned".to_string()))?
                .insert(ledger.id(), ledger.version());
        }
        Ok(ledger)
    }

    fn check(&self, tables: &Tables) -> Result<(), LedgerError> {
        let mut staged_references = HashSet::new();
        for account in &self.accounts {
            if tables.accounts.contains_key(&account.reference)
                || !staged_references.insert(account.reference.as_str())
            {
                return Err(LedgerError::DuplicateReference(account.reference.clone()));
            }
        }

        for ledger in self.ledgers.values() {
            let stored = tables.ledgers.get(&ledger.id()).map(Ledger::version);
            check_version(stored, ledger.version(), || format!("ledger {}", ledger.name()))?;
        }
        let reads = self
            .ledger_reads
            .lock()
            .map_err(|_| LedgerError::Store("ledger read set poisoned".to_string()))?;
        for (id, version) in reads.iter() {
            if self.ledgers.contains_key(id) {
                continue;
            }
            if tables.ledgers.get(id).map(Ledger::version) != Some(*version) {
                return Err(LedgerError::ConcurrencyConflict {
                    record: format!("ledger {id}"),
                });
            }
        }

        for ledger in self.ledgers.values() {
            let Some(end) = ledger.end_period() else {
                continue;
            };
            if tables
                .transactions
                .iter()
                .any(|t| t.ledger_id() == ledger.id() && t.accounting_time() >= end)
            {
                return Err(LedgerError::ConcurrencyConflict {
                    record: format!("postings of ledger {}", ledger.name()),
                });
            }
        }

        let open_ledgers = tables
            .ledgers
            .values()
            .filter(|ledger| !self.ledgers.contains_key(&ledger.id()))
            .chain(self.ledgers.values())
            .filter(|ledger| ledger.is_open())
            .count();
        if open_ledgers > 1 {
            return Err(LedgerError::ConcurrencyConflict {
                record: "open ledger".to_string(),
            });
        }

        for balance in self.balances.values() {
            let stored = tables.balances.get(&balance.key()).map(Balance::version);
            check_version(stored, balance.version(), || {
                format!(
                    "balance of account {} in ledger {}",
                    balance.account_reference(),
                    balance.ledger_id()
                )
            })?;
        }

        for (business_reference, reservation) in &self.reservations {
            let stored = tables
                .reservations
                .get(business_reference)
                .map(Reservation::version);
            if stored.is_some() && reservation.version() == 0 {
                return Err(LedgerError::DuplicateReservation(
                    business_reference.clone(),
                ));
            }
            check_version(stored, reservation.version(), || {
                format!("reservation {business_reference}")
            })?;
        }

        Ok(())
    }
}

/// A new record (`version == 0`) must be absent; an update must match.
fn check_version(
    stored: Option<u64>,
    staged: u64,
    record: impl FnOnce() -> String,
) -> Result<(), LedgerError> {
    let matches = match stored {
        Some(version) => version == staged,
        None => staged == 0,
    };
    if matches {
        Ok(())
    } else {
        Err(LedgerError::ConcurrencyConflict { record: record() })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_accounts(&mut self, accounts: &[AccountId]) -> Result<(), LedgerError> {
        for &account_id in accounts {
            if self.guards.iter().any(|(held, _)| *held == account_id) {
                continue;
            }
            let guard = self.inner.locks.acquire(account_id).await?;
            self.guards.push((account_id, guard));
        }
        Ok(())
    }

    async fn find_account_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Account>, LedgerError> {
        if let Some(account) = self.accounts.iter().find(|a| a.reference == reference) {
            return Ok(Some(account.clone()));
        }
        Ok(self.inner.tables()?.accounts.get(reference).cloned())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        self.accounts.push(account.clone());
        Ok(())
    }

    async fn find_ledger_at(
        &self,
        instant: DateTime<Utc>,
    ) -> Result<Option<Ledger>, LedgerError> {
        let found = self
            .ledger_view()?
            .into_iter()
            .find(|ledger| ledger.fits_period(instant));
        self.track(found)
    }

    async fn find_open_ledger(&self) -> Result<Option<Ledger>, LedgerError> {
        let found = self.ledger_view()?.into_iter().find(Ledger::is_open);
        self.track(found)
    }

    async fn find_previous_ledger(&self, ledger: &Ledger) -> Result<Option<Ledger>, LedgerError> {
        let found = self
            .ledger_view()?
            .into_iter()
            .filter(|candidate| candidate.start_period() < ledger.start_period())
            .max_by_key(Ledger::start_period);
        self.track(found)
    }

    async fn find_ledgers(&self) -> Result<Vec<Ledger>, LedgerError> {
        self.ledger_view()
    }

    async fn save_ledger(&mut self, ledger: &Ledger) -> Result<(), LedgerError> {
        self.ledgers.insert(ledger.id(), ledger.clone());
        Ok(())
    }

    async fn find_balance(&self, key: BalanceKey) -> Result<Option<Balance>, LedgerError> {
        if let Some(balance) = self.balances.get(&key) {
            return Ok(Some(balance.clone()));
        }
        Ok(self.inner.tables()?.balances.get(&key).cloned())
    }

    async fn save_balance(&mut self, balance: &Balance) -> Result<(), LedgerError> {
        self.balances.insert(balance.key(), balance.clone());
        Ok(())
    }

    async fn save_transaction(
        &mut self,
        transaction: &AccountingTransaction,
    ) -> Result<(), LedgerError> {
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn find_latest_accounting_time(
        &self,
        ledger_id: LedgerId,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let committed = self
            .inner
            .tables()?
            .transactions
            .iter()
            .filter(|t| t.ledger_id() == ledger_id)
            .map(AccountingTransaction::accounting_time)
            .max();
        let staged = self
            .transactions
            .iter()
            .filter(|t| t.ledger_id() == ledger_id)
            .map(AccountingTransaction::accounting_time)
            .max();
        Ok(committed.max(staged))
    }

    async fn find_reservation(
        &self,
        business_reference: &str,
    ) -> Result<Option<Reservation>, LedgerError> {
        if let Some(reservation) = self.reservations.get(business_reference) {
            return Ok(Some(reservation.clone()));
        }
        Ok(self
            .inner
            .tables()?
            .reservations
            .get(business_reference)
            .cloned())
    }

    async fn save_reservation(&mut self, reservation: &Reservation) -> Result<(), LedgerError> {
        self.reservations.insert(
            reservation.business_reference().to_string(),
            reservation.clone(),
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let this = *self;
        let mut tables = this.inner.tables()?;
        this.check(&tables)?;

        for account in this.accounts {
            tables.accounts.insert(account.reference.clone(), account);
        }
        for (id, ledger) in this.ledgers {
            tables.ledgers.insert(id, ledger.committed());
        }
        for (key, balance) in this.balances {
            tables.balances.insert(key, balance.committed());
        }
        for (business_reference, reservation) in this.reservations {
            tables
                .reservations
                .insert(business_reference, reservation.committed());
        }
        let posted = this.transactions.len();
        tables.transactions.extend(this.transactions);
        drop(tables);

        debug!(
            transactions = posted,
            locks = this.guards.len(),
            "store transaction committed"
        );
        Ok(())
    }
}

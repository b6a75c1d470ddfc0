//! Per-account exclusive locks.

use std::sync::Arc;
use std::time::Duration;

use banker_core::ledger::LedgerError;
use banker_shared::types::AccountId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard proving exclusive access to one account. Released on drop.
pub type AccountGuard = OwnedMutexGuard<()>;

/// One async mutex per account, created on first use.
#[derive(Debug)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl AccountLocks {
    /// Creates an empty lock table. Acquisition gives up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Waits for exclusive access to `account_id`.
    ///
    /// # Errors
    ///
    /// `LockTimeout` if the lock is not free within the configured timeout.
    pub async fn acquire(&self, account_id: AccountId) -> Result<AccountGuard, LedgerError> {
        // Clone the handle so no map shard stays borrowed across the await.
        let mutex = self
            .locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        tokio::time::timeout(self.timeout, mutex.lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(account_id.to_string()))
    }

    /// Number of accounts that were ever locked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no account was ever locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

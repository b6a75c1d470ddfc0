//! Ledger service: posting money between accounts.
//!
//! Every mutating operation runs inside one store transaction:
//! 1. Resolve the account references
//! 2. Lock the touched accounts in the global locking order
//! 3. Find the ledger fitting the accounting time
//! 4. Load or create the balances, seeding new ones from earlier ledgers
//! 5. Build the balanced transaction and check the overdraft policy
//! 6. Apply the deltas, stage every record and commit
//!
//! Nothing is retried here. Conflicts surface as retryable errors.

use std::sync::Arc;

use banker_shared::LedgerConfig;
use banker_shared::types::{AccountId, Money};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::account::{Account, AccountPurpose, AccountType};
use super::balance::{Balance, BalanceKey};
use super::error::LedgerError;
use super::locking::{self, SystemAccountRefs};
use super::period::Ledger;
use super::reservation::Reservation;
use super::store::{LedgerStore, StoreTransaction};
use super::transaction::AccountingTransaction;

/// The well-known accounts owned by the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAccounts {
    /// The bank's reserve (asset) account.
    pub banking_reserve: Account,
    /// Holds reserved amounts.
    pub reservations: Account,
    /// Funds premium payouts.
    pub premiums: Account,
}

/// Orchestrates locking, balance lookup and posting against a record store.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    refs: SystemAccountRefs,
    allow_closed_period_posting: bool,
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("refs", &self.refs)
            .field("allow_closed_period_posting", &self.allow_closed_period_posting)
            .finish_non_exhaustive()
    }
}

impl LedgerService {
    /// Creates a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            refs: SystemAccountRefs::from(config),
            allow_closed_period_posting: config.allow_closed_period_posting,
        }
    }

    /// References of the configured system accounts.
    #[must_use]
    pub fn system_refs(&self) -> &SystemAccountRefs {
        &self.refs
    }

    // ========== Accounts ==========

    /// Creates the banking-reserve, reservations and premiums accounts if
    /// they do not exist yet.
    ///
    /// Calling this repeatedly returns the same accounts.
    ///
    /// # Errors
    ///
    /// `SystemAccountMismatch` if a system reference is held by an account
    /// of the wrong type or purpose.
    #[instrument(skip(self))]
    pub async fn ensure_system_accounts(&self) -> Result<SystemAccounts, LedgerError> {
        match self.try_ensure_system_accounts().await {
            Err(LedgerError::DuplicateReference(reference)) => {
                debug!(%reference, "system account created concurrently, reloading");
                self.try_ensure_system_accounts().await
            }
            result => result,
        }
    }

    async fn try_ensure_system_accounts(&self) -> Result<SystemAccounts, LedgerError> {
        let mut tx = self.store.begin().await?;
        let banking_reserve = find_or_stage_system_account(
            tx.as_mut(),
            &self.refs.banking_reserve,
            "Banking reserve",
            AccountType::Asset,
        )
        .await?;
        let reservations = find_or_stage_system_account(
            tx.as_mut(),
            &self.refs.reservations,
            "Reservations",
            AccountType::Liability,
        )
        .await?;
        let premiums = find_or_stage_system_account(
            tx.as_mut(),
            &self.refs.premiums,
            "Premiums",
            AccountType::Liability,
        )
        .await?;
        tx.commit().await?;

        Ok(SystemAccounts {
            banking_reserve,
            reservations,
            premiums,
        })
    }

    /// Creates a new account.
    ///
    /// # Errors
    ///
    /// `BlankReference` for an empty reference, `ReservedReference` for a
    /// system reference with a non-system purpose, `DuplicateReference` if
    /// the reference is taken.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        reference: &str,
        name: &str,
        account_type: AccountType,
        purpose: AccountPurpose,
    ) -> Result<Account, LedgerError> {
        let account = Account::new_instance(reference, name, account_type, purpose)?;
        if purpose != AccountPurpose::System && self.refs.is_system_reference(&account.reference) {
            warn!(reference = %account.reference, "system reference rejected");
            return Err(LedgerError::ReservedReference(account.reference));
        }

        let mut tx = self.store.begin().await?;
        if tx.find_account_by_reference(&account.reference).await?.is_some() {
            return Err(LedgerError::DuplicateReference(account.reference));
        }
        tx.save_account(&account).await?;
        tx.commit().await?;

        info!(account_id = %account.id, reference = %account.reference, "account created");
        Ok(account)
    }

    /// Looks up an account by reference.
    #[instrument(skip(self))]
    pub async fn find_account(&self, reference: &str) -> Result<Account, LedgerError> {
        let tx = self.store.begin().await?;
        require_account(tx.as_ref(), reference).await
    }

    /// Sorts `accounts` into the global locking order.
    pub fn sort_accounts_for_locking(&self, accounts: &mut [Account]) {
        locking::sort_accounts_for_locking(accounts, &self.refs);
    }

    // ========== Ledger periods ==========

    /// Opens the very first, open-ended ledger starting at `start`.
    ///
    /// # Errors
    ///
    /// `LedgerAlreadyExists` if any ledger exists.
    #[instrument(skip(self))]
    pub async fn open_first_ledger(&self, start: DateTime<Utc>) -> Result<Ledger, LedgerError> {
        let mut tx = self.store.begin().await?;
        if let Some(existing) = tx.find_ledgers().await?.into_iter().next() {
            return Err(LedgerError::LedgerAlreadyExists(existing.name().to_string()));
        }

        let ledger = Ledger::starting_at(start);
        tx.save_ledger(&ledger).await?;
        tx.commit().await?;

        info!(ledger = %ledger.name(), start = %start, "first ledger opened");
        Ok(ledger.committed())
    }

    /// The open-ended ledger.
    #[instrument(skip(self))]
    pub async fn current_ledger(&self) -> Result<Ledger, LedgerError> {
        let tx = self.store.begin().await?;
        tx.find_open_ledger().await?.ok_or(LedgerError::NoOpenLedger)
    }

    /// Closes the open ledger at `new_start` and opens the next one.
    ///
    /// Balances of the new ledger are created lazily on first use.
    ///
    /// # Errors
    ///
    /// `NoOpenLedger` if there is nothing to close, `InvalidPeriod` if
    /// `new_start` is not after the open ledger's start or not after its
    /// latest posting.
    #[instrument(skip(self))]
    pub async fn close_period_and_open_next(
        &self,
        new_start: DateTime<Utc>,
    ) -> Result<Ledger, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut current = tx.find_open_ledger().await?.ok_or(LedgerError::NoOpenLedger)?;
        if let Some(latest) = tx.find_latest_accounting_time(current.id()).await?
            && new_start <= latest
        {
            warn!(
                ledger = %current.name(),
                %new_start,
                %latest,
                "rollover before last posting rejected"
            );
            return Err(LedgerError::InvalidPeriod {
                ledger: current.name().to_string(),
                reason: format!("new start {new_start} is not after the last posting at {latest}"),
            });
        }
        current.close(new_start)?;
        let next = Ledger::starting_at(new_start);

        tx.save_ledger(&current).await?;
        tx.save_ledger(&next).await?;
        tx.commit().await?;

        info!(
            closed = %current.name(),
            opened = %next.name(),
            start = %new_start,
            "ledger period rolled over"
        );
        Ok(next.committed())
    }

    // ========== Balances ==========

    /// The balance of `account` in the ledger fitting `at`, created and
    /// persisted if missing.
    #[instrument(skip(self, account), fields(account = %account.reference))]
    pub async fn get_or_create_balance(
        &self,
        account: &Account,
        at: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_accounts(&[account.id]).await?;
        let ledger = ledger_at(tx.as_ref(), at).await?;

        match tx.find_balance(balance_key(&ledger, account)).await? {
            Some(balance) => Ok(balance),
            None => {
                let balance = new_balance(tx.as_ref(), account, &ledger).await?;
                tx.save_balance(&balance).await?;
                tx.commit().await?;
                Ok(balance.committed())
            }
        }
    }

    /// The end amount of `account_ref` in the ledger fitting `at`.
    ///
    /// Read only: a missing balance is reported with the amount it would be
    /// seeded with, but not created.
    #[instrument(skip(self))]
    pub async fn get_balance(
        &self,
        account_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<Money, LedgerError> {
        let tx = self.store.begin().await?;
        let account = require_account(tx.as_ref(), account_ref).await?;
        let ledger = ledger_at(tx.as_ref(), at).await?;

        match tx.find_balance(balance_key(&ledger, &account)).await? {
            Some(balance) => Ok(balance.end_amount()),
            None => carried_amount(tx.as_ref(), account.id, &ledger).await,
        }
    }

    // ========== Postings ==========

    /// Moves `amount` from `from_ref` to `to_ref`: debits `from`, credits `to`.
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount`, `SameAccountTransfer` for bad input
    /// - `AccountNotFound`, `NoLedgerForInstant` for unknown targets
    /// - `PeriodClosed` if `at` falls in a closed ledger
    /// - `Overdrawn` if a protected balance would go negative
    /// - `ConcurrencyConflict`, `LockTimeout` if the caller should retry
    #[instrument(skip(self, description))]
    pub async fn transfer(
        &self,
        from_ref: &str,
        to_ref: &str,
        amount: Money,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<AccountingTransaction, LedgerError> {
        ensure_positive(amount)?;

        let mut tx = self.store.begin().await?;
        let from = require_account(tx.as_ref(), from_ref).await?;
        let to = require_account(tx.as_ref(), to_ref).await?;
        if from.id == to.id {
            return Err(LedgerError::SameAccountTransfer(from.reference));
        }

        self.lock(tx.as_mut(), &[&from, &to]).await?;
        let transaction = self
            .post(tx.as_mut(), &from, &to, amount, description, at)
            .await?;
        tx.commit().await?;

        info!(
            transaction_id = %transaction.id(),
            from = %from.reference,
            to = %to.reference,
            %amount,
            "transfer posted"
        );
        Ok(transaction)
    }

    /// Moves `amount` from the banking reserve into `account_ref`.
    pub async fn deposit(
        &self,
        account_ref: &str,
        amount: Money,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<AccountingTransaction, LedgerError> {
        self.transfer(&self.refs.banking_reserve, account_ref, amount, description, at)
            .await
    }

    /// Moves `amount` from `account_ref` back to the banking reserve.
    pub async fn withdraw(
        &self,
        account_ref: &str,
        amount: Money,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<AccountingTransaction, LedgerError> {
        self.transfer(account_ref, &self.refs.banking_reserve, amount, description, at)
            .await
    }

    /// Holds `amount` from `account_ref` in the reservations account under
    /// `business_reference`.
    ///
    /// # Errors
    ///
    /// `DuplicateReservation` if the business reference was used before,
    /// plus everything [`Self::transfer`] can return.
    #[instrument(skip(self, description))]
    pub async fn reserve(
        &self,
        account_ref: &str,
        amount: Money,
        business_reference: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<Reservation, LedgerError> {
        ensure_positive(amount)?;

        let mut tx = self.store.begin().await?;
        let payer = require_account(tx.as_ref(), account_ref).await?;
        let reservations = require_account(tx.as_ref(), &self.refs.reservations).await?;
        if payer.id == reservations.id {
            return Err(LedgerError::SameAccountTransfer(payer.reference));
        }
        let reservation = Reservation::new(business_reference, &payer, amount)?;

        self.lock(tx.as_mut(), &[&payer, &reservations]).await?;
        if tx
            .find_reservation(reservation.business_reference())
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateReservation(
                reservation.business_reference().to_string(),
            ));
        }

        let transaction = self
            .post(tx.as_mut(), &payer, &reservations, amount, description, at)
            .await?;
        tx.save_reservation(&reservation).await?;
        tx.commit().await?;

        info!(
            transaction_id = %transaction.id(),
            business_reference = %reservation.business_reference(),
            payer = %payer.reference,
            %amount,
            "amount reserved"
        );
        Ok(reservation.committed())
    }

    /// Pays `amount` out of the reservation `business_reference` to
    /// `account_ref`.
    ///
    /// # Errors
    ///
    /// `ReservationNotFound` for an unknown business reference,
    /// `InvalidCharge` if `amount` exceeds what is still held.
    #[instrument(skip(self, description))]
    pub async fn charge(
        &self,
        account_ref: &str,
        amount: Money,
        business_reference: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<AccountingTransaction, LedgerError> {
        ensure_positive(amount)?;

        let mut tx = self.store.begin().await?;
        let beneficiary = require_account(tx.as_ref(), account_ref).await?;
        let reservations = require_account(tx.as_ref(), &self.refs.reservations).await?;
        if beneficiary.id == reservations.id {
            return Err(LedgerError::SameAccountTransfer(beneficiary.reference));
        }

        self.lock(tx.as_mut(), &[&reservations, &beneficiary])
            .await?;
        let mut reservation = require_reservation(tx.as_ref(), business_reference).await?;
        if let Err(err) = reservation.charge(amount) {
            warn!(
                business_reference = %reservation.business_reference(),
                %amount,
                remaining = %reservation.remaining(),
                "charge rejected"
            );
            return Err(err);
        }

        let transaction = self
            .post(tx.as_mut(), &reservations, &beneficiary, amount, description, at)
            .await?;
        tx.save_reservation(&reservation).await?;
        tx.commit().await?;

        info!(
            transaction_id = %transaction.id(),
            business_reference = %reservation.business_reference(),
            beneficiary = %beneficiary.reference,
            %amount,
            status = reservation.status().code(),
            "reservation charged"
        );
        Ok(transaction)
    }

    /// Returns whatever is still held under `business_reference` to the payer.
    ///
    /// Returns `None` if nothing was left to return.
    #[instrument(skip(self, description))]
    pub async fn release(
        &self,
        business_reference: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<AccountingTransaction>, LedgerError> {
        let mut tx = self.store.begin().await?;
        let payer_ref = require_reservation(tx.as_ref(), business_reference)
            .await?
            .account_reference()
            .to_string();
        let payer = require_account(tx.as_ref(), &payer_ref).await?;
        let reservations = require_account(tx.as_ref(), &self.refs.reservations).await?;

        self.lock(tx.as_mut(), &[&reservations, &payer]).await?;
        let mut reservation = require_reservation(tx.as_ref(), business_reference).await?;
        let remaining = reservation.release();
        if remaining.is_zero() {
            debug!(business_reference = %reservation.business_reference(), "nothing to release");
            return Ok(None);
        }

        let transaction = self
            .post(tx.as_mut(), &reservations, &payer, remaining, description, at)
            .await?;
        tx.save_reservation(&reservation).await?;
        tx.commit().await?;

        info!(
            transaction_id = %transaction.id(),
            business_reference = %reservation.business_reference(),
            payer = %payer.reference,
            amount = %remaining,
            "reservation released"
        );
        Ok(Some(transaction))
    }

    // ========== Internals ==========

    async fn lock(
        &self,
        tx: &mut dyn StoreTransaction,
        accounts: &[&Account],
    ) -> Result<(), LedgerError> {
        let mut ordered = accounts.to_vec();
        locking::sort_accounts_for_locking(&mut ordered, &self.refs);
        ordered.dedup_by_key(|account| account.id);

        let ids: Vec<AccountId> = ordered.iter().map(|account| account.id).collect();
        tx.lock_accounts(&ids).await?;
        debug!(
            accounts = ?ordered.iter().map(|a| a.reference.as_str()).collect::<Vec<_>>(),
            "accounts locked"
        );
        Ok(())
    }

    /// Posts a two-entry transfer inside `tx`. Both accounts must be locked.
    async fn post(
        &self,
        tx: &mut dyn StoreTransaction,
        from: &Account,
        to: &Account,
        amount: Money,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<AccountingTransaction, LedgerError> {
        let ledger = ledger_at(tx, at).await?;
        if !ledger.is_open() && !self.allow_closed_period_posting {
            warn!(ledger = %ledger.name(), %at, "posting into closed ledger rejected");
            return Err(LedgerError::PeriodClosed(ledger.name().to_string()));
        }

        let from_balance = load_balance(tx, from, &ledger).await?;
        let to_balance = load_balance(tx, to, &ledger).await?;

        let prepared = ledger
            .create_transaction(description, at, Utc::now())?
            .debit(&from_balance, amount)?
            .credit(&to_balance, amount)?
            .build()?;

        for balance in [&from_balance, &to_balance] {
            if !balance.is_overdraft_protected() {
                continue;
            }
            let projected = balance.projected(prepared.delta_for(balance.key()))?;
            if projected.is_negative() {
                warn!(
                    account = %balance.account_reference(),
                    ledger = %ledger.name(),
                    balance = %balance.end_amount(),
                    %amount,
                    "overdraft rejected"
                );
                return Err(LedgerError::Overdrawn {
                    account: balance.account_reference().to_string(),
                    ledger: ledger.name().to_string(),
                    balance: balance.end_amount(),
                    amount,
                });
            }
        }

        let mut balances = [from_balance, to_balance];
        let transaction = prepared.apply(&mut balances)?;
        for balance in &balances {
            tx.save_balance(balance).await?;
        }
        tx.save_transaction(&transaction).await?;
        Ok(transaction)
    }
}

fn ensure_positive(amount: Money) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositiveAmount(amount))
    }
}

fn balance_key(ledger: &Ledger, account: &Account) -> BalanceKey {
    BalanceKey {
        ledger_id: ledger.id(),
        account_id: account.id,
    }
}

async fn require_account(
    tx: &dyn StoreTransaction,
    reference: &str,
) -> Result<Account, LedgerError> {
    let reference = reference.trim();
    tx.find_account_by_reference(reference)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(reference.to_string()))
}

async fn require_reservation(
    tx: &dyn StoreTransaction,
    business_reference: &str,
) -> Result<Reservation, LedgerError> {
    let business_reference = business_reference.trim();
    tx.find_reservation(business_reference)
        .await?
        .ok_or_else(|| LedgerError::ReservationNotFound(business_reference.to_string()))
}

async fn ledger_at(tx: &dyn StoreTransaction, at: DateTime<Utc>) -> Result<Ledger, LedgerError> {
    tx.find_ledger_at(at)
        .await?
        .ok_or(LedgerError::NoLedgerForInstant(at))
}

async fn find_or_stage_system_account(
    tx: &mut dyn StoreTransaction,
    reference: &str,
    name: &str,
    account_type: AccountType,
) -> Result<Account, LedgerError> {
    if let Some(account) = tx.find_account_by_reference(reference).await? {
        if account.account_type != account_type || account.purpose != AccountPurpose::System {
            return Err(LedgerError::SystemAccountMismatch {
                reference: account.reference,
                account_type: account.account_type.code(),
                purpose: account.purpose.code(),
            });
        }
        return Ok(account);
    }

    let account = Account::new_instance(reference, name, account_type, AccountPurpose::System)?;
    tx.save_account(&account).await?;
    info!(reference = %account.reference, "system account created");
    Ok(account)
}

/// The existing balance of `account` in `ledger`, or a new, unsaved one.
async fn load_balance(
    tx: &dyn StoreTransaction,
    account: &Account,
    ledger: &Ledger,
) -> Result<Balance, LedgerError> {
    match tx.find_balance(balance_key(ledger, account)).await? {
        Some(balance) => Ok(balance),
        None => new_balance(tx, account, ledger).await,
    }
}

async fn new_balance(
    tx: &dyn StoreTransaction,
    account: &Account,
    ledger: &Ledger,
) -> Result<Balance, LedgerError> {
    let start_amount = carried_amount(tx, account.id, ledger).await?;
    debug!(
        account = %account.reference,
        ledger = %ledger.name(),
        %start_amount,
        "balance created"
    );
    Ok(Balance::new(ledger, account, start_amount))
}

/// End amount of the most recent earlier ledger holding a balance for
/// `account_id`, or zero.
///
/// Ledgers in between without a balance are skipped.
async fn carried_amount(
    tx: &dyn StoreTransaction,
    account_id: AccountId,
    ledger: &Ledger,
) -> Result<Money, LedgerError> {
    let mut current = tx.find_previous_ledger(ledger).await?;
    while let Some(previous) = current {
        let key = BalanceKey {
            ledger_id: previous.id(),
            account_id,
        };
        if let Some(balance) = tx.find_balance(key).await? {
            return Ok(balance.end_amount());
        }
        current = tx.find_previous_ledger(&previous).await?;
    }
    Ok(Money::ZERO)
}

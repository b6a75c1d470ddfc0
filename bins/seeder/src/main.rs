//! Ledger seeder for banker development and testing.
//!
//! Creates the system accounts, opens the first ledger at the start of the
//! current year and posts a small set of sample movements, then logs every
//! resulting balance.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use banker_core::ledger::{AccountPurpose, AccountType, LedgerError, LedgerService};
use banker_shared::types::Money;
use banker_shared::{AppConfig, AppError, LoggingConfig};
use banker_store::MemoryStore;
use chrono::{Datelike, TimeZone, Utc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sample customer accounts: (reference, name, purpose).
const SAMPLE_ACCOUNTS: [(&str, &str, AccountPurpose); 3] = [
    ("user1", "Test User One", AccountPurpose::Current),
    ("user1P", "Test User One Premium", AccountPurpose::Premium),
    ("user2", "Test User Two", AccountPurpose::Current),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    seed(&config).await.map_err(|err| match err.downcast::<LedgerError>() {
        Ok(ledger_err) => {
            let code = ledger_err.error_code();
            let app_err = AppError::from(ledger_err);
            error!(
                code,
                retryable = app_err.is_retryable(),
                error = %app_err,
                "Seeding failed"
            );
            app_err.into()
        }
        Err(other) => other,
    })
}

/// Bootstraps the store and posts the sample data.
async fn seed(config: &AppConfig) -> anyhow::Result<()> {
    let store = MemoryStore::new(&config.store);
    let service = LedgerService::new(Arc::new(store.clone()), &config.ledger);

    let system = service.ensure_system_accounts().await?;
    info!(
        banking_reserve = %system.banking_reserve.reference,
        reservations = %system.reservations.reference,
        premiums = %system.premiums.reference,
        "System accounts ready"
    );

    let now = Utc::now();
    let year_start = Utc
        .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .context("Start of the current year is not a valid instant")?;
    let ledger = service.open_first_ledger(year_start).await?;
    info!(ledger = %ledger.name(), "Ledger opened");

    for (reference, name, purpose) in SAMPLE_ACCOUNTS {
        service
            .create_account(reference, name, AccountType::Liability, purpose)
            .await?;
    }

    seed_activity(&service, &config.ledger.premiums_reference).await?;

    for balance in store.balances()? {
        info!(
            account = %balance.account_reference(),
            account_type = balance.account_type().code(),
            start = %balance.start_amount(),
            end = %balance.end_amount(),
            "Balance"
        );
    }
    info!(
        transactions = store.transactions()?.len(),
        "Seeding complete"
    );

    Ok(())
}

/// Initialises the global subscriber with either plain or JSON output.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.as_str().into());

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Posts deposits, a transfer, a premium payout and a full reservation cycle.
async fn seed_activity(service: &LedgerService, premiums: &str) -> anyhow::Result<()> {
    let now = Utc::now();

    service
        .deposit("user1", Money::new(10_000), "Initial deposit", now)
        .await?;
    service
        .deposit("user2", Money::new(5_000), "Initial deposit", now)
        .await?;
    service
        .transfer("user1", "user2", Money::new(1_250), "Shared dinner", now)
        .await?;
    service
        .transfer(premiums, "user1P", Money::new(500), "Welcome bonus", now)
        .await?;

    service
        .reserve("user2", Money::new(2_000), "ride-0001", "Ride fare hold", now)
        .await?;
    service
        .charge("user1", Money::new(1_500), "ride-0001", "Ride fare", now)
        .await?;
    let released = service
        .release("ride-0001", "Unused fare hold", now)
        .await?;
    info!(
        released = released.is_some(),
        "Sample reservation settled"
    );

    Ok(())
}

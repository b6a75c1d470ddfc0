//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Ledger policy configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Reference of the banking-reserve asset account.
    #[serde(default = "default_banking_reserve_reference")]
    pub banking_reserve_reference: String,
    /// Reference of the reservations liability account.
    #[serde(default = "default_reservations_reference")]
    pub reservations_reference: String,
    /// Reference of the premiums liability account.
    #[serde(default = "default_premiums_reference")]
    pub premiums_reference: String,
    /// Whether postings may target a ledger that has already been closed.
    #[serde(default)]
    pub allow_closed_period_posting: bool,
}

fn default_banking_reserve_reference() -> String {
    "bank".to_string()
}

fn default_reservations_reference() -> String {
    "reservations".to_string()
}

fn default_premiums_reference() -> String {
    "premiums".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            banking_reserve_reference: default_banking_reserve_reference(),
            reservations_reference: default_reservations_reference(),
            premiums_reference: default_premiums_reference(),
            allow_closed_period_posting: false,
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Maximum time to wait for a single account lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Lock timeout as a `Duration`.
    #[must_use]
    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "banker=info,seeder=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("BANKER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

//! Shared types, errors, and configuration for the banker ledger.
//!
//! This crate provides common types used across all other crates:
//! - Integer money amounts with checked arithmetic
//! - Typed IDs for type-safe entity references
//! - Caller-facing error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, LedgerConfig, LoggingConfig, StoreConfig};
pub use error::{AppError, AppResult};

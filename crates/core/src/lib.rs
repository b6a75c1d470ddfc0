//! Core business logic for the banker ledger.
//!
//! This crate contains the accounting domain and its orchestration, with no
//! persistence technology of its own. Storage is reached through the
//! [`ledger::LedgerStore`] port.
//!
//! # Modules
//!
//! - `ledger` - Double-entry bookkeeping, ledger periods and posting

pub mod ledger;

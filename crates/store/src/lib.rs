//! Record store implementations for the banker ledger.
//!
//! This crate provides:
//! - [`MemoryStore`], an in-memory implementation of the ledger store port
//! - [`AccountLocks`], per-account async locks bounded by a timeout

pub mod locks;
pub mod memory;

pub use locks::{AccountGuard, AccountLocks};
pub use memory::{MemoryStore, MemoryTransaction};

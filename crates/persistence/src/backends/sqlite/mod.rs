//! SQLite relational store.
//!
//! Connections come from an r2d2 pool that is built on connect and dropped
//! on close. Every pooled connection gets the configured busy timeout and
//! foreign-key enforcement; file databases also switch to WAL journaling.
//!
//! Each transaction checks out one pooled connection and holds it until
//! commit or rollback. Dropping an unfinished [`SqliteTransaction`] rolls it
//! back.
//!
//! # Example
//!
//! ```no_run
//! use parley_persistence::backends::sqlite::SqliteStore;
//! use parley_persistence::composite::RelationalStoreConfig;
//!
//! let store = SqliteStore::new(RelationalStoreConfig::new("./data/parley.db"));
//! assert!(!store.config().is_memory());
//! ```
//!
//! In-memory databases are private to a single connection, so an in-memory
//! store always uses a pool of exactly one connection.

mod backend;
mod transaction;

pub use backend::{SqliteHandle, SqliteStore};
pub use transaction::SqliteTransaction;

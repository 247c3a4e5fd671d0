//! Parley Persistence Layer
//!
//! This crate keeps the chat backend's two stores usable while either of them
//! is missing, slow, or down. It supervises one connection per store, probes
//! their health, reconnects them in the background, and runs best-effort
//! transactions that span both.
//!
//! # Stores
//!
//! | Store | Role | Backend | Feature |
//! |-------|------|---------|---------|
//! | Document | conversation history | MongoDB | `mongodb` (default) |
//! | Relational | users, settings | SQLite | `sqlite` (default) |
//!
//! The coordinator itself is generic over [`StoreBackend`], so other
//! backends (or test doubles) can be plugged in for either store.
//!
//! # Architecture
//!
//! - [`error`] - Error types for all operations
//! - [`core`] - Backend and operation traits, outcomes, notifications
//! - [`composite`] - The [`DualStoreCoordinator`] and its configuration
//! - [`backends`] - MongoDB and SQLite implementations
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(all(feature = "sqlite", feature = "mongodb"))]
//! # async fn example() {
//! use std::sync::Arc;
//!
//! use parley_persistence::backends;
//! use parley_persistence::composite::{
//!     DocumentStoreConfig, PersistenceConfig, RelationalStoreConfig,
//! };
//!
//! let config = PersistenceConfig::default()
//!     .with_document(DocumentStoreConfig::new("mongodb://localhost:27017", "parley"))
//!     .with_relational(RelationalStoreConfig::new("./data/parley.db"));
//!
//! let coordinator = Arc::new(backends::from_config(config));
//! if !coordinator.connect_all().await {
//!     // Degraded: at least one configured store is down.
//! }
//! coordinator.start_recovery_scheduler();
//!
//! let report = coordinator.check_health().await;
//! println!("all healthy: {}", report.all_healthy());
//!
//! coordinator.close_all().await;
//! # }
//! ```
//!
//! # Cross-Store Transactions
//!
//! The two stores share no transaction protocol. A
//! [`TransactionRequest`] runs each side in its own native transaction and
//! undoes a committed side with its compensating action when the other side
//! fails. See [`composite::transaction`] for the exact guarantees.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod composite;
pub mod core;
pub mod error;

// Re-export commonly used types at crate root
pub use composite::{
    CoordinatorConfig, DualStoreCoordinator, HealthCheckResponse, HealthReport,
    PersistenceConfig, ProbeResult, RecoveryReport, StoreStatus,
};
pub use error::{StorageError, StorageResult};

// Re-export core traits
pub use core::{
    NotificationPublisher, StoreBackend, StoreKind, StoreOperation, TransactionOutcome,
    TransactionRequest,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

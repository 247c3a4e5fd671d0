//! Store abstraction for the two backing databases.
//!
//! This module defines [`StoreKind`] and the [`StoreBackend`] trait. Each store
//! driver implements the trait so the coordinator can supervise it without
//! knowing which database sits behind it.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

/// Identifies which backing store a state or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The schema-flexible document store (MongoDB).
    Document,
    /// The embedded relational store (SQLite).
    Relational,
}

impl StoreKind {
    /// Both stores, in the order cross-store work is attempted.
    pub const ALL: [StoreKind; 2] = [StoreKind::Document, StoreKind::Relational];

    /// Returns the other store.
    pub fn other(&self) -> StoreKind {
        match self {
            StoreKind::Document => StoreKind::Relational,
            StoreKind::Relational => StoreKind::Document,
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Document => write!(f, "document"),
            StoreKind::Relational => write!(f, "relational"),
        }
    }
}

/// A backing store that the coordinator can connect to, probe and transact on.
///
/// Implementations perform exactly one attempt per call. Retries, backoff and
/// timeouts are applied by the coordinator, which also owns the resulting
/// handle.
///
/// # Example
///
/// ```ignore
/// use parley_persistence::core::StoreBackend;
///
/// let handle = store.connect().await?;
/// store.ping(&handle).await?;
///
/// let mut tx = store.begin(&handle).await?;
/// // ... work against `tx` ...
/// store.commit(tx).await?;
/// ```
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug + 'static {
    /// Client reference produced by a successful connect.
    ///
    /// Cloning must be cheap (reference counted); the coordinator hands out
    /// clones to callers for the duration of one call.
    type Handle: Clone + Send + Sync + 'static;

    /// The store's native transaction.
    type Transaction: Send + 'static;

    /// Returns which store this backend serves.
    fn kind(&self) -> StoreKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Performs one connection attempt.
    async fn connect(&self) -> BackendResult<Self::Handle>;

    /// Performs a lightweight liveness round-trip.
    async fn ping(&self, handle: &Self::Handle) -> BackendResult<()>;

    /// Opens a native transaction.
    async fn begin(&self, handle: &Self::Handle) -> BackendResult<Self::Transaction>;

    /// Commits a native transaction.
    async fn commit(&self, tx: Self::Transaction) -> BackendResult<()>;

    /// Rolls back a native transaction.
    async fn rollback(&self, tx: Self::Transaction) -> BackendResult<()>;

    /// Releases the handle and flushes any pending state.
    async fn close(&self, handle: Self::Handle);
}

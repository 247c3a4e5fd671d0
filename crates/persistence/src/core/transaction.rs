//! Cross-store transaction request and outcome types.
//!
//! A [`TransactionRequest`] carries at most one [`StoreOperation`] per store.
//! The coordinator runs each inside that store's native transaction and
//! reports what happened in a [`TransactionOutcome`]. There is no atomicity
//! across the two stores; the only repair mechanism is a best-effort
//! compensating action on the side that committed.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageResult, TransactionError, TransactionResult};

use super::backend::{StoreBackend, StoreKind};

/// A unit of work against one store.
///
/// # Example
///
/// ```ignore
/// struct InsertProfile { user_id: i64 }
///
/// #[async_trait]
/// impl StoreOperation<SqliteStore> for InsertProfile {
///     async fn execute(&self, tx: &mut SqliteTransaction) -> StorageResult<()> {
///         let user_id = self.user_id;
///         tx.run(move |conn| {
///             conn.execute("INSERT INTO profiles (user_id) VALUES (?1)", [user_id])?;
///             Ok(())
///         })
///         .await
///     }
///
///     async fn compensate(&self, pool: &SqliteHandle) -> StorageResult<()> {
///         pool.get()?.execute("DELETE FROM profiles WHERE user_id = ?1", [self.user_id])?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait StoreOperation<B: StoreBackend>: Send + Sync {
    /// Runs the operation inside the store's native transaction.
    async fn execute(&self, tx: &mut B::Transaction) -> StorageResult<()>;

    /// Undoes the already-committed effect of [`execute`](Self::execute).
    ///
    /// The default reports that no compensating action exists.
    async fn compensate(&self, _handle: &B::Handle) -> StorageResult<()> {
        Err(TransactionError::RolledBack {
            reason: "operation defines no compensating action".to_string(),
        }
        .into())
    }
}

/// A request to run up to one operation per store.
pub struct TransactionRequest<D: StoreBackend, R: StoreBackend> {
    /// Operation for the document store.
    pub document: Option<Box<dyn StoreOperation<D>>>,
    /// Operation for the relational store.
    pub relational: Option<Box<dyn StoreOperation<R>>>,
    /// Compensate the committed side when the other side fails.
    pub rollback_on_failure: bool,
}

impl<D: StoreBackend, R: StoreBackend> TransactionRequest<D, R> {
    /// Creates an empty request with compensation enabled.
    pub fn new() -> Self {
        Self {
            document: None,
            relational: None,
            rollback_on_failure: true,
        }
    }

    /// Sets the document-store operation.
    pub fn with_document(mut self, op: impl StoreOperation<D> + 'static) -> Self {
        self.document = Some(Box::new(op));
        self
    }

    /// Sets the relational-store operation.
    pub fn with_relational(mut self, op: impl StoreOperation<R> + 'static) -> Self {
        self.relational = Some(Box::new(op));
        self
    }

    /// Enables or disables compensation.
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }
}

impl<D: StoreBackend, R: StoreBackend> Default for TransactionRequest<D, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: StoreBackend, R: StoreBackend> fmt::Debug for TransactionRequest<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRequest")
            .field("document", &self.document.is_some())
            .field("relational", &self.relational.is_some())
            .field("rollback_on_failure", &self.rollback_on_failure)
            .finish()
    }
}

/// What happened when a [`TransactionRequest`] was run.
///
/// A side without a requested operation reports success vacuously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    /// Document side succeeded (or had nothing to do).
    pub document_success: bool,
    /// Relational side succeeded (or had nothing to do).
    pub relational_success: bool,
    /// Error reported by the document side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_error: Option<String>,
    /// Error reported by the relational side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational_error: Option<String>,
    /// Document side committed work.
    pub document_committed: bool,
    /// Relational side committed work.
    pub relational_committed: bool,
    /// A compensating action was attempted, whether or not it succeeded.
    pub rollback_attempted: bool,
    /// Neither store was connected, so nothing was attempted.
    pub unavailable: bool,
    /// Both sides succeeded.
    pub overall_success: bool,
}

impl TransactionOutcome {
    /// Outcome for a request made while neither store was connected.
    pub fn unavailable() -> Self {
        Self {
            document_success: false,
            relational_success: false,
            document_error: None,
            relational_error: None,
            document_committed: false,
            relational_committed: false,
            rollback_attempted: false,
            unavailable: true,
            overall_success: false,
        }
    }

    /// Returns the success flag for one side.
    pub fn success(&self, store: StoreKind) -> bool {
        match store {
            StoreKind::Document => self.document_success,
            StoreKind::Relational => self.relational_success,
        }
    }

    /// Returns whether one side committed.
    pub fn committed(&self, store: StoreKind) -> bool {
        match store {
            StoreKind::Document => self.document_committed,
            StoreKind::Relational => self.relational_committed,
        }
    }

    /// Returns the error reported by one side.
    pub fn error(&self, store: StoreKind) -> Option<&str> {
        match store {
            StoreKind::Document => self.document_error.as_deref(),
            StoreKind::Relational => self.relational_error.as_deref(),
        }
    }

    /// Returns the store that committed while the other failed, if any.
    pub fn partially_committed(&self) -> Option<StoreKind> {
        StoreKind::ALL
            .into_iter()
            .find(|&store| self.committed(store) && !self.success(store.other()))
    }

    /// Converts the outcome into a typed result.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::Unavailable`] if neither store was connected.
    /// - [`TransactionError::PartialFailure`] if one store committed and the other failed.
    /// - [`TransactionError::RolledBack`] for any other failure.
    pub fn into_result(self) -> TransactionResult<Self> {
        if self.unavailable {
            return Err(TransactionError::Unavailable);
        }
        if self.overall_success {
            return Ok(self);
        }

        if let Some(committed) = self.partially_committed() {
            let failed = committed.other();
            return Err(TransactionError::PartialFailure {
                committed,
                failed,
                message: self.error(failed).unwrap_or("unknown error").to_string(),
            });
        }

        let reason = StoreKind::ALL
            .into_iter()
            .filter_map(|store| self.error(store).map(|e| format!("{}: {}", store, e)))
            .collect::<Vec<_>>()
            .join("; ");
        Err(TransactionError::RolledBack { reason })
    }
}

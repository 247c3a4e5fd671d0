//! Best-effort cross-store transactions.
//!
//! Each requested operation runs inside its own store's native transaction:
//! begin, execute, commit, or roll back that store's transaction on error.
//! The document store is always attempted first, then the relational store,
//! and a failure on one side never stops the other side from being tried.
//!
//! There is no atomicity across the stores. If exactly one side committed and
//! the other failed, the committed side's compensating action is run once
//! (when `rollback_on_failure` is set). A failed compensation leaves the
//! stores inconsistent; it is logged at error level and nothing else is done.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::{
    Notification, StoreBackend, StoreKind, StoreOperation, TRANSACTION_TOPIC, TransactionOutcome,
    TransactionRequest,
};
use crate::error::{StorageError, StorageResult, TransactionError};

use super::DualStoreCoordinator;
use super::state::StoreSlot;

/// What happened on one side of a transaction.
#[derive(Debug, Default)]
struct SideResult {
    success: bool,
    committed: bool,
    error: Option<String>,
}

impl SideResult {
    /// No operation was requested for this side.
    fn vacuous() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn committed() -> Self {
        Self {
            success: true,
            committed: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Runs one transaction step, mapping a timeout to [`TransactionError::Timeout`].
async fn bounded<T, E>(
    store: StoreKind,
    step_timeout: Duration,
    step: impl Future<Output = Result<T, E>>,
) -> StorageResult<T>
where
    E: Into<StorageError>,
{
    match timeout(step_timeout, step).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransactionError::Timeout {
            store,
            timeout_ms: step_timeout.as_millis() as u64,
        }
        .into()),
    }
}

/// Runs one side's operation inside that store's native transaction.
async fn run_side<B: StoreBackend>(
    slot: &StoreSlot<B>,
    handle: Option<B::Handle>,
    op: Option<&dyn StoreOperation<B>>,
    step_timeout: Duration,
) -> SideResult {
    let store = slot.kind();
    let Some(op) = op else {
        return SideResult::vacuous();
    };

    let (Some(backend), Some(handle)) = (slot.backend(), handle) else {
        let err = slot
            .require_handle()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("{} store is not connected", store));
        warn!(store = %store, error = %err, "Skipping operation for unavailable store");
        return SideResult::failed(err);
    };

    let mut tx = match bounded(store, step_timeout, backend.begin(&handle)).await {
        Ok(tx) => tx,
        Err(e) => {
            warn!(store = %store, error = %e, "Failed to begin transaction");
            return SideResult::failed(e);
        }
    };

    if let Err(e) = bounded(store, step_timeout, op.execute(&mut tx)).await {
        warn!(store = %store, error = %e, "Operation failed; rolling back");
        if let Err(rollback_err) = bounded(store, step_timeout, backend.rollback(tx)).await {
            warn!(store = %store, error = %rollback_err, "Rollback failed");
        }
        return SideResult::failed(e);
    }

    match bounded(store, step_timeout, backend.commit(tx)).await {
        Ok(()) => {
            debug!(store = %store, "Transaction committed");
            SideResult::committed()
        }
        Err(e) => {
            warn!(store = %store, error = %e, "Commit failed");
            SideResult::failed(e)
        }
    }
}

/// Runs the compensating action for a committed side.
async fn compensate<B: StoreBackend>(
    slot: &StoreSlot<B>,
    op: &dyn StoreOperation<B>,
    step_timeout: Duration,
) {
    let store = slot.kind();
    warn!(store = %store, "Other store failed; compensating committed operation");

    let result = match slot.require_handle() {
        Ok(handle) => bounded(store, step_timeout, op.compensate(&handle)).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => info!(store = %store, "Compensating action applied"),
        Err(e) => {
            let err = TransactionError::CompensationFailed {
                store,
                message: e.to_string(),
            };
            error!(store = %store, error = %err, "Stores left inconsistent");
        }
    }
}

impl<D: StoreBackend, R: StoreBackend> DualStoreCoordinator<D, R> {
    /// Runs up to one operation per store, compensating on partial failure.
    ///
    /// Never retries; the caller decides whether to run the request again.
    /// If neither store is connected nothing is attempted and the outcome has
    /// `unavailable` set. Use [`TransactionOutcome::into_result`] for a typed
    /// error.
    pub async fn run_cross_store_transaction(
        &self,
        request: TransactionRequest<D, R>,
    ) -> TransactionOutcome {
        let document_handle = self.document.handle();
        let relational_handle = self.relational.handle();

        if document_handle.is_none() && relational_handle.is_none() {
            warn!(error = %TransactionError::Unavailable, "Cross-store transaction rejected");
            return TransactionOutcome::unavailable();
        }

        let TransactionRequest {
            document,
            relational,
            rollback_on_failure,
        } = request;
        let step_timeout = self.config.operation_timeout;

        let doc = run_side(
            &self.document,
            document_handle,
            document.as_deref(),
            step_timeout,
        )
        .await;
        let rel = run_side(
            &self.relational,
            relational_handle,
            relational.as_deref(),
            step_timeout,
        )
        .await;

        let mut rollback_attempted = false;
        if rollback_on_failure {
            if doc.committed && !rel.success {
                if let Some(op) = document.as_deref() {
                    rollback_attempted = true;
                    compensate(&self.document, op, step_timeout).await;
                }
            } else if rel.committed && !doc.success {
                if let Some(op) = relational.as_deref() {
                    rollback_attempted = true;
                    compensate(&self.relational, op, step_timeout).await;
                }
            }
        }

        let outcome = TransactionOutcome {
            document_success: doc.success,
            relational_success: rel.success,
            document_error: doc.error,
            relational_error: rel.error,
            document_committed: doc.committed,
            relational_committed: rel.committed,
            rollback_attempted,
            unavailable: false,
            overall_success: doc.success && rel.success,
        };

        if outcome.overall_success {
            debug!("Cross-store transaction succeeded");
        } else {
            warn!(
                document_success = outcome.document_success,
                relational_success = outcome.relational_success,
                rollback_attempted = outcome.rollback_attempted,
                "Cross-store transaction failed"
            );
        }

        self.publish(
            TRANSACTION_TOPIC,
            Notification::Transaction(outcome.clone()),
        )
        .await;

        outcome
    }
}

//! Connection supervision.
//!
//! Opens, re-opens and releases the connections of both stores. The document
//! store is retried with exponential backoff at startup; the relational store
//! is a local resource and gets a single attempt. Every attempt is bounded by
//! `connect_timeout` and runs under the store's attempt lock, so at most one
//! attempt per store is ever in flight.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::core::{StoreBackend, StoreKind};
use crate::error::{BackendError, BackendResult, ConnectionError, StorageResult};

use super::DualStoreCoordinator;
use super::config::CoordinatorConfig;
use super::health::ProbeResult;
use super::state::{RecoveryPhase, StoreSlot, StoreStatus};

/// Result of a single reconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconnectAttempt {
    /// The store was already connected; no attempt was made.
    AlreadyConnected,
    /// A fresh connection was established.
    Reconnected,
}

/// Type-erased view of a [`StoreSlot`], so both stores can be driven by the
/// same code regardless of their driver types.
#[async_trait]
pub(crate) trait SupervisedStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    fn configured(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn status(&self) -> StoreStatus;

    fn set_phase(&self, phase: RecoveryPhase);

    /// Re-probes a live connection or connects with up to `max_attempts` attempts.
    async fn establish(&self, max_attempts: u32, config: &CoordinatorConfig) -> bool;

    /// One connection attempt, unless the store is already connected.
    async fn try_reconnect(&self, config: &CoordinatorConfig) -> BackendResult<ReconnectAttempt>;

    /// Liveness probe. Never touches the connection state.
    async fn probe(&self, timeout: Duration) -> ProbeResult;

    /// Drops and closes the live handle.
    async fn disconnect(&self, reason: Option<String>, timeout: Duration);
}

impl<B: StoreBackend> StoreSlot<B> {
    /// One bounded connection attempt. Caller holds the attempt lock.
    async fn connect_once(&self, backend: &B, connect_timeout: Duration) -> BackendResult<()> {
        self.update(|state| state.record_attempt());

        let result = match timeout(connect_timeout, backend.connect()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                backend_name: backend.name().to_string(),
                operation: "connect".to_string(),
                timeout_ms: connect_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(handle) => {
                let stale = self.update(|state| state.record_connected(handle));
                if let Some(stale) = stale {
                    close_handle(backend, stale, connect_timeout).await;
                }
                Ok(())
            }
            Err(e) => {
                self.update(|state| state.record_failure(&e));
                Err(e)
            }
        }
    }

    /// Takes the handle out of the state and closes it. Caller holds the attempt lock.
    async fn release(&self, backend: &B, reason: Option<String>, close_timeout: Duration) -> bool {
        match self.update(|state| state.take_handle(reason)) {
            Some(handle) => {
                close_handle(backend, handle, close_timeout).await;
                true
            }
            None => false,
        }
    }
}

async fn close_handle<B: StoreBackend>(backend: &B, handle: B::Handle, close_timeout: Duration) {
    if timeout(close_timeout, backend.close(handle)).await.is_err() {
        warn!(
            store = %backend.kind(),
            timeout_ms = close_timeout.as_millis() as u64,
            "Closing store handle timed out"
        );
    }
}

/// Restores the idle phase when a reconnect finishes or is cancelled.
struct PhaseGuard<'a, B: StoreBackend>(&'a StoreSlot<B>);

impl<B: StoreBackend> Drop for PhaseGuard<'_, B> {
    fn drop(&mut self) {
        self.0.set_phase(RecoveryPhase::Idle);
    }
}

#[async_trait]
impl<B: StoreBackend> SupervisedStore for StoreSlot<B> {
    fn kind(&self) -> StoreKind {
        StoreSlot::kind(self)
    }

    fn configured(&self) -> bool {
        StoreSlot::configured(self)
    }

    fn is_connected(&self) -> bool {
        StoreSlot::is_connected(self)
    }

    fn status(&self) -> StoreStatus {
        StoreSlot::status(self)
    }

    fn set_phase(&self, phase: RecoveryPhase) {
        StoreSlot::set_phase(self, phase)
    }

    async fn establish(&self, max_attempts: u32, config: &CoordinatorConfig) -> bool {
        let store = StoreSlot::kind(self);
        let Some(backend) = self.backend() else {
            debug!(store = %store, "Skipping unconfigured store");
            return true;
        };

        let _attempt = self.attempt_lock.lock().await;

        if let Some(handle) = self.handle() {
            let probe = timeout(config.health.timeout, backend.ping(&handle)).await;
            drop(handle);
            match probe {
                Ok(Ok(())) => {
                    debug!(store = %store, "Store already connected");
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(store = %store, error = %e, "Connected store failed its probe; reconnecting");
                    self.release(backend, Some(e.to_string()), config.connect_timeout)
                        .await;
                }
                Err(_) => {
                    warn!(store = %store, "Connected store probe timed out; reconnecting");
                    self.release(
                        backend,
                        Some("health probe timed out".to_string()),
                        config.connect_timeout,
                    )
                    .await;
                }
            }
        }

        let max_attempts = max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            let delay = config.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                info!(
                    store = %store,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying connection after backoff"
                );
                sleep(delay).await;
            }

            match self.connect_once(backend, config.connect_timeout).await {
                Ok(()) => {
                    info!(
                        store = %store,
                        backend = backend.name(),
                        attempt = attempt,
                        "Store connected"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        store = %store,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        let err = ConnectionError::Unavailable {
            store,
            attempts: max_attempts,
            message: last_error.unwrap_or_default(),
        };
        error!(store = %store, error = %err, "Giving up; store stays disconnected until recovery");
        false
    }

    async fn try_reconnect(&self, config: &CoordinatorConfig) -> BackendResult<ReconnectAttempt> {
        let store = StoreSlot::kind(self);
        let Some(backend) = self.backend() else {
            return Err(BackendError::InvalidConfiguration {
                backend_name: store.to_string(),
                message: "store is not configured".to_string(),
            });
        };

        let _attempt = self.attempt_lock.lock().await;
        if StoreSlot::is_connected(self) {
            return Ok(ReconnectAttempt::AlreadyConnected);
        }

        StoreSlot::set_phase(self, RecoveryPhase::Reconnecting);
        let _phase = PhaseGuard(self);

        self.connect_once(backend, config.connect_timeout).await?;
        info!(store = %store, backend = backend.name(), "Store reconnected");
        Ok(ReconnectAttempt::Reconnected)
    }

    async fn probe(&self, probe_timeout: Duration) -> ProbeResult {
        let (Some(backend), Some(handle)) = (self.backend(), self.handle()) else {
            return ProbeResult::NotConnected;
        };

        let start = Instant::now();
        match timeout(probe_timeout, backend.ping(&handle)).await {
            Ok(Ok(())) => ProbeResult::Healthy {
                response_time_ms: start.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => ProbeResult::Unhealthy {
                error: e.to_string(),
            },
            Err(_) => ProbeResult::Timeout,
        }
    }

    async fn disconnect(&self, reason: Option<String>, close_timeout: Duration) {
        let Some(backend) = self.backend() else {
            return;
        };

        let _attempt = self.attempt_lock.lock().await;
        if self.release(backend, reason, close_timeout).await {
            info!(store = %StoreSlot::kind(self), "Store disconnected");
        }
    }
}

impl<D: StoreBackend, R: StoreBackend> DualStoreCoordinator<D, R> {
    /// Connects both stores.
    ///
    /// The document store gets up to `retry.max_attempts` attempts with
    /// exponential backoff; the relational store gets one. Already-connected
    /// stores are re-probed and kept if healthy, so calling this twice is safe.
    ///
    /// Returns true if every configured store is connected. With no store
    /// configured this returns true and the system runs without persistence.
    pub async fn connect_all(&self) -> bool {
        let (document, relational) = tokio::join!(
            self.document
                .establish(self.config.retry.max_attempts, &self.config),
            self.relational.establish(1, &self.config),
        );

        if document && relational {
            info!(
                document = SupervisedStore::is_connected(&self.document),
                relational = SupervisedStore::is_connected(&self.relational),
                "Persistence ready"
            );
        } else {
            warn!(
                document = SupervisedStore::is_connected(&self.document),
                relational = SupervisedStore::is_connected(&self.relational),
                "Persistence running degraded"
            );
        }

        document && relational
    }

    /// Performs exactly one connection attempt for the store.
    ///
    /// Returns true if the store is connected afterwards. No backoff is
    /// applied; pacing is the caller's job. A store that is already connected
    /// is left alone and reports true.
    pub async fn reconnect(&self, store: StoreKind) -> bool {
        let slot = self.slot(store);
        if !slot.configured() {
            debug!(store = %store, "Reconnect requested for unconfigured store");
            return false;
        }

        match slot.try_reconnect(&self.config).await {
            Ok(_) => true,
            Err(e) => {
                debug!(store = %store, error = %e, "Reconnect attempt failed");
                false
            }
        }
    }

    /// Returns the live document-store handle.
    ///
    /// Do not keep the handle across calls; a concurrent reconnect replaces it.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotConnected`] if the store is disconnected.
    /// - [`ConnectionError::ConfigurationMissing`] if it was never configured.
    pub fn get_document_store(&self) -> StorageResult<D::Handle> {
        self.document.require_handle()
    }

    /// Returns the live relational-store handle.
    ///
    /// Do not keep the handle across calls; a concurrent reconnect replaces it.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotConnected`] if the store is disconnected.
    /// - [`ConnectionError::ConfigurationMissing`] if it was never configured.
    pub fn get_relational_store(&self) -> StorageResult<R::Handle> {
        self.relational.require_handle()
    }

    /// Stops the recovery loops and releases both connections.
    ///
    /// Safe to call more than once. Must run before process exit so the
    /// relational store can checkpoint its write-ahead log.
    pub async fn close_all(&self) {
        self.stop_recovery_scheduler().await;

        let close_timeout = self.config.connect_timeout;
        tokio::join!(
            self.document.disconnect(None, close_timeout),
            self.relational.disconnect(None, close_timeout),
        );
        info!("Persistence closed");
    }
}

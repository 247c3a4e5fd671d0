//! Per-store connection state.
//!
//! Each store has one [`StoreSlot`]: the configured driver, the live handle
//! with its bookkeeping, and an attempt lock that serializes every
//! connect/reconnect/close for that store. State reads take a short
//! synchronous lock and never wait on I/O.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{StoreBackend, StoreKind};
use crate::error::{BackendError, ConnectionError, StorageResult};

/// Phase of the recovery state machine for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Checking whether the store needs recovery.
    Probing,
    /// A reconnection attempt is in flight.
    Reconnecting,
}

impl std::fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryPhase::Idle => write!(f, "idle"),
            RecoveryPhase::Probing => write!(f, "probing"),
            RecoveryPhase::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Connection bookkeeping for one store.
///
/// A store is connected exactly when it holds a handle, so a connected state
/// without a handle cannot be represented.
#[derive(Debug)]
pub struct StoreConnectionState<H> {
    handle: Option<H>,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    phase: RecoveryPhase,
}

impl<H> Default for StoreConnectionState<H> {
    fn default() -> Self {
        Self {
            handle: None,
            last_error: None,
            last_attempt_at: None,
            consecutive_failures: 0,
            phase: RecoveryPhase::Idle,
        }
    }
}

impl<H> StoreConnectionState<H> {
    /// Returns true if the store holds a live handle.
    pub fn connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns the live handle.
    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    /// Returns the last connection error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns when the last connection attempt started.
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Returns the number of failed attempts since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the current recovery phase.
    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Records the start of a connection attempt.
    pub(crate) fn record_attempt(&mut self) {
        self.last_attempt_at = Some(Utc::now());
    }

    /// Installs a fresh handle, returning the one it replaces.
    pub(crate) fn record_connected(&mut self, handle: H) -> Option<H> {
        self.last_error = None;
        self.consecutive_failures = 0;
        self.handle.replace(handle)
    }

    /// Records a failed attempt.
    pub(crate) fn record_failure(&mut self, error: &BackendError) {
        self.last_error = Some(error.to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Drops the handle, returning it for closing.
    pub(crate) fn take_handle(&mut self, reason: Option<String>) -> Option<H> {
        if reason.is_some() {
            self.last_error = reason;
        }
        self.handle.take()
    }

    pub(crate) fn set_phase(&mut self, phase: RecoveryPhase) {
        self.phase = phase;
    }
}

/// Point-in-time snapshot of one store's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Which store.
    pub store: StoreKind,
    /// Connection parameters were supplied.
    pub configured: bool,
    /// A live handle is held.
    pub connected: bool,
    /// Last connection error.
    pub last_error: Option<String>,
    /// When the last connection attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Current recovery phase.
    pub phase: RecoveryPhase,
}

/// A store driver together with its connection state.
pub(crate) struct StoreSlot<B: StoreBackend> {
    kind: StoreKind,
    backend: Option<B>,
    state: RwLock<StoreConnectionState<B::Handle>>,
    /// Held for the whole of every connect, reconnect and close.
    pub(crate) attempt_lock: tokio::sync::Mutex<()>,
}

impl<B: StoreBackend> std::fmt::Debug for StoreSlot<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSlot")
            .field("kind", &self.kind)
            .field("backend", &self.backend)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl<B: StoreBackend> StoreSlot<B> {
    pub(crate) fn new(kind: StoreKind, backend: Option<B>) -> Self {
        if let Some(backend) = &backend {
            debug_assert_eq!(backend.kind(), kind, "driver registered for the wrong store");
            info!(store = %kind, backend = backend.name(), "Store configured");
        } else {
            info!(store = %kind, "Store not configured; running without it");
        }

        Self {
            kind,
            backend,
            state: RwLock::new(StoreConnectionState::default()),
            attempt_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn kind(&self) -> StoreKind {
        self.kind
    }

    pub(crate) fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Connection parameters were supplied at construction.
    pub(crate) fn configured(&self) -> bool {
        self.backend.is_some()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.read().connected()
    }

    /// Returns a clone of the live handle.
    pub(crate) fn handle(&self) -> Option<B::Handle> {
        self.state.read().handle().cloned()
    }

    /// Returns the live handle or a typed error.
    pub(crate) fn require_handle(&self) -> StorageResult<B::Handle> {
        if !self.configured() {
            return Err(ConnectionError::ConfigurationMissing { store: self.kind }.into());
        }
        self.handle()
            .ok_or_else(|| ConnectionError::NotConnected { store: self.kind }.into())
    }

    /// Runs `f` with exclusive access to the state.
    ///
    /// `f` must not block; the lock is synchronous.
    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut StoreConnectionState<B::Handle>) -> T) -> T {
        f(&mut self.state.write())
    }

    pub(crate) fn set_phase(&self, phase: RecoveryPhase) {
        self.state.write().set_phase(phase);
    }

    pub(crate) fn status(&self) -> StoreStatus {
        let state = self.state.read();
        StoreStatus {
            store: self.kind,
            configured: self.configured(),
            connected: state.connected(),
            last_error: state.last_error.clone(),
            last_attempt_at: state.last_attempt_at,
            consecutive_failures: state.consecutive_failures,
            phase: state.phase,
        }
    }
}

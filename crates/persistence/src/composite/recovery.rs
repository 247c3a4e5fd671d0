//! Background recovery for disconnected stores.
//!
//! One loop per store wakes every `recovery.tick_interval`. Each tick walks a
//! small state machine (`Idle -> Probing -> Reconnecting -> Idle`):
//!
//! 1. An unconfigured store stays idle; the loop keeps running so shutdown is
//!    the same for both stores.
//! 2. A connected store is probed (when `probe_connected` is set). A failed
//!    probe drops the connection and falls through to step 3.
//! 3. A disconnected store gets one reconnect attempt, and a
//!    [`RecoveryNotification`] announces the result. There is no backoff
//!    beyond the tick itself; startup backoff already happened in
//!    [`connect_all`](DualStoreCoordinator::connect_all).
//! 4. An unexpected (non-transient) error waits `recovery.error_cooldown`
//!    before the next tick.
//!
//! Loops stop on cancellation and are aborted if they have not exited within
//! `recovery.shutdown_grace`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{
    Notification, RECOVERY_TOPIC, RecoveryNotification, RecoveryOutcome, StoreBackend, StoreKind,
};
use crate::error::BackendResult;

use super::DualStoreCoordinator;
use super::health::ProbeResult;
use super::state::RecoveryPhase;
use super::supervisor::ReconnectAttempt;

/// Running recovery loops.
#[derive(Debug)]
pub(crate) struct RecoveryHandle {
    token: CancellationToken,
    tasks: Vec<(StoreKind, JoinHandle<()>)>,
}

/// Per-store result of a manual recovery.
///
/// `true` means the store is connected afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Document store is connected.
    pub document: bool,
    /// Relational store is connected.
    pub relational: bool,
}

impl<D: StoreBackend, R: StoreBackend> DualStoreCoordinator<D, R> {
    /// Spawns the two recovery loops.
    ///
    /// Returns false if the loops are already running. Must be called from
    /// within a tokio runtime.
    pub fn start_recovery_scheduler(self: &Arc<Self>) -> bool {
        let mut recovery = self.recovery.lock();
        if recovery.is_some() {
            debug!("Recovery scheduler already running");
            return false;
        }

        let token = CancellationToken::new();
        let tasks = StoreKind::ALL
            .into_iter()
            .map(|store| {
                let coordinator = Arc::clone(self);
                let token = token.child_token();
                (
                    store,
                    tokio::spawn(coordinator.run_recovery_loop(store, token)),
                )
            })
            .collect();

        *recovery = Some(RecoveryHandle { token, tasks });
        info!(
            tick_interval = %humantime::format_duration(self.config.recovery.tick_interval),
            "Recovery scheduler started"
        );
        true
    }

    /// Cancels the recovery loops and waits for them to exit.
    ///
    /// Loops still running after `recovery.shutdown_grace` are aborted.
    /// Safe to call when the scheduler is not running.
    pub async fn stop_recovery_scheduler(&self) {
        let Some(handle) = self.recovery.lock().take() else {
            return;
        };

        handle.token.cancel();
        let deadline = Instant::now() + self.config.recovery.shutdown_grace;

        for (store, mut task) in handle.tasks {
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => debug!(store = %store, "Recovery loop exited"),
                Ok(Err(e)) => warn!(store = %store, error = %e, "Recovery loop ended abnormally"),
                Err(_) => {
                    warn!(store = %store, "Recovery loop did not stop within grace period; aborting");
                    task.abort();
                }
            }
        }
        info!("Recovery scheduler stopped");
    }

    /// Returns true while the recovery loops are running.
    pub fn is_recovery_running(&self) -> bool {
        self.recovery.lock().is_some()
    }

    /// Attempts to reconnect every configured but disconnected store now.
    ///
    /// Runs independently of the loop timer but shares the per-store attempt
    /// lock, so it never overlaps a scheduled attempt for the same store.
    pub async fn trigger_manual_recovery(&self) -> RecoveryReport {
        let (document, relational) = tokio::join!(
            self.manual_recovery(StoreKind::Document),
            self.manual_recovery(StoreKind::Relational),
        );

        info!(
            document = document,
            relational = relational,
            "Manual recovery finished"
        );
        RecoveryReport {
            document,
            relational,
        }
    }

    async fn manual_recovery(&self, store: StoreKind) -> bool {
        if !self.slot(store).configured() {
            return false;
        }
        self.recover_store(store, true).await.unwrap_or(false)
    }

    /// One reconnect attempt with its notification.
    ///
    /// Returns `Ok(false)` for expected connection failures and `Err` for
    /// anything unexpected.
    async fn recover_store(&self, store: StoreKind, manual: bool) -> BackendResult<bool> {
        let slot = self.slot(store);

        let result = slot.try_reconnect(&self.config).await;
        let outcome = match &result {
            Ok(ReconnectAttempt::AlreadyConnected) => return Ok(true),
            Ok(ReconnectAttempt::Reconnected) => RecoveryOutcome::Success,
            Err(e) => {
                warn!(
                    store = %store,
                    manual = manual,
                    consecutive_failures = slot.status().consecutive_failures,
                    error = %e,
                    "Recovery attempt failed"
                );
                RecoveryOutcome::Failure
            }
        };

        // Stamp the notification with when the attempt started, not when it ended.
        let mut notification = RecoveryNotification::new(store, outcome, manual);
        if let Some(started) = slot.status().last_attempt_at {
            notification = notification.with_attempted_at(started);
        }
        self.publish(RECOVERY_TOPIC, Notification::Recovery(notification))
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_transient() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn run_recovery_loop(self: Arc<Self>, store: StoreKind, token: CancellationToken) {
        let tick = self.config.recovery.tick_interval;
        let mut wait = tick;
        debug!(store = %store, "Recovery loop started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = sleep(wait) => {}
            }
            wait = tick;

            let slot = self.slot(store);
            if !slot.configured() {
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    slot.set_phase(RecoveryPhase::Idle);
                    break;
                }
                result = self.recovery_tick(store) => result,
            };
            slot.set_phase(RecoveryPhase::Idle);

            if let Err(e) = result {
                error!(
                    store = %store,
                    error = %e,
                    cooldown = %humantime::format_duration(self.config.recovery.error_cooldown),
                    "Unexpected error during recovery; cooling down"
                );
                wait = self.config.recovery.error_cooldown;
            }
        }

        debug!(store = %store, "Recovery loop stopped");
    }

    async fn recovery_tick(&self, store: StoreKind) -> BackendResult<()> {
        let slot = self.slot(store);
        slot.set_phase(RecoveryPhase::Probing);

        if slot.is_connected() {
            if !self.config.recovery.probe_connected {
                return Ok(());
            }

            match slot.probe(self.config.health.timeout).await {
                ProbeResult::Healthy { .. } => return Ok(()),
                ProbeResult::NotConnected => {}
                failed => {
                    let reason = match failed {
                        ProbeResult::Unhealthy { error } => error,
                        _ => "health probe timed out".to_string(),
                    };
                    warn!(
                        store = %store,
                        error = %reason,
                        "Connected store failed its probe; dropping connection for recovery"
                    );
                    slot.disconnect(Some(reason), self.config.connect_timeout)
                        .await;
                }
            }
        }

        self.recover_store(store, false).await.map(|_| ())
    }
}

//! Dual-store coordinator.
//!
//! The chat backend keeps its data in two stores with different durability
//! characteristics: a document store (MongoDB) and an embedded relational
//! store (SQLite). Either may be missing or down. This module keeps the
//! persistence layer usable through those failures.
//!
//! # Overview
//!
//! | Component | Where | Runs |
//! |-----------|-------|------|
//! | Connection supervision | [`supervisor`] | caller's task |
//! | Health probes | [`health`] | caller's task |
//! | Recovery loops | [`recovery`] | one background task per store |
//! | Cross-store transactions | [`transaction`] | caller's task |
//!
//! # Lifecycle
//!
//! A coordinator is built once at process start and shared by reference:
//!
//! ```ignore
//! let coordinator = Arc::new(DualStoreCoordinator::new(
//!     Some(MongoStore::new(mongo_config)),
//!     Some(SqliteStore::new(sqlite_config)),
//!     CoordinatorConfig::default(),
//! ));
//!
//! coordinator.connect_all().await;
//! coordinator.start_recovery_scheduler();
//!
//! // ... serve requests ...
//!
//! coordinator.close_all().await;
//! ```
//!
//! # Degraded Mode
//!
//! A store that was never configured is not an error: accessors report
//! [`ConnectionError::ConfigurationMissing`](crate::error::ConnectionError) and
//! the recovery loop for it idles. A configured store that is down reports
//! `NotConnected` until its recovery loop brings it back.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration types
//! - [`state`] - Per-store connection state
//! - [`supervisor`] - Connect, reconnect, close and handle accessors
//! - [`health`] - Liveness probes and health reports
//! - [`recovery`] - Background recovery loops and manual recovery
//! - [`transaction`] - Best-effort cross-store transactions

pub mod config;
pub mod health;
pub mod recovery;
pub mod state;
pub mod supervisor;
pub mod transaction;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::{NoopPublisher, Notification, NotificationPublisher, StoreBackend, StoreKind};
use crate::error::PublishError;

pub use config::{
    CoordinatorConfig, DocumentStoreConfig, HealthConfig, PersistenceConfig, RecoveryConfig,
    RelationalStoreConfig, RetryConfig,
};
pub use health::{ComponentHealth, HealthCheckResponse, HealthReport, ProbeResult};
pub use recovery::RecoveryReport;
pub use state::{RecoveryPhase, StoreConnectionState, StoreStatus};

use recovery::RecoveryHandle;
use state::StoreSlot;
use supervisor::SupervisedStore;

/// Coordinates connections, health, recovery and transactions for both stores.
///
/// `D` drives the document store and `R` the relational store. Either may be
/// absent, in which case that store is unconfigured for the coordinator's
/// whole lifetime.
pub struct DualStoreCoordinator<D: StoreBackend, R: StoreBackend> {
    pub(crate) document: StoreSlot<D>,
    pub(crate) relational: StoreSlot<R>,
    pub(crate) config: CoordinatorConfig,
    publisher: Arc<dyn NotificationPublisher>,
    pub(crate) recovery: Mutex<Option<RecoveryHandle>>,
}

impl<D: StoreBackend, R: StoreBackend> std::fmt::Debug for DualStoreCoordinator<D, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualStoreCoordinator")
            .field("document", &self.document)
            .field("relational", &self.relational)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<D: StoreBackend, R: StoreBackend> DualStoreCoordinator<D, R> {
    /// Creates a coordinator. Nothing is connected until [`connect_all`](Self::connect_all).
    pub fn new(document: Option<D>, relational: Option<R>, config: CoordinatorConfig) -> Self {
        Self {
            document: StoreSlot::new(StoreKind::Document, document),
            relational: StoreSlot::new(StoreKind::Relational, relational),
            config,
            publisher: Arc::new(NoopPublisher),
            recovery: Mutex::new(None),
        }
    }

    /// Sets the publisher used for recovery and transaction notifications.
    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Returns the coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Returns true if connection parameters were supplied for the store.
    pub fn is_configured(&self, store: StoreKind) -> bool {
        self.slot(store).configured()
    }

    /// Returns true if the store currently holds a live connection.
    pub fn is_connected(&self, store: StoreKind) -> bool {
        self.slot(store).is_connected()
    }

    /// Returns a snapshot of one store's state.
    pub fn status(&self, store: StoreKind) -> StoreStatus {
        self.slot(store).status()
    }

    pub(crate) fn slot(&self, store: StoreKind) -> &dyn SupervisedStore {
        match store {
            StoreKind::Document => &self.document,
            StoreKind::Relational => &self.relational,
        }
    }

    /// Publishes a notification, logging and swallowing any failure.
    pub(crate) async fn publish(&self, topic: &str, notification: Notification) {
        let timeout = self.config.publish_timeout;
        let result = match tokio::time::timeout(timeout, self.publisher.publish(topic, notification))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                topic: topic.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(()) => debug!(topic = %topic, "Notification published"),
            Err(e) => warn!(topic = %topic, error = %e, "Failed to publish notification"),
        }
    }
}

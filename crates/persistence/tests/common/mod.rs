//! Test infrastructure for the persistence layer.
//!
//! This module provides a scriptable in-memory [`StoreBackend`] and
//! recording operations for exercising the coordinator without real stores.

#![allow(dead_code)]

pub mod mock;
pub mod operations;

// Re-export commonly used items
pub use mock::*;
pub use operations::*;

use std::sync::Arc;
use std::time::Duration;

use parley_persistence::composite::{
    CoordinatorConfig, DualStoreCoordinator, RecoveryConfig, RetryConfig,
};
use async_trait::async_trait;
use parley_persistence::core::{ChannelPublisher, NotificationPublisher};
use parley_persistence::core::{Notification, StoreKind};
use parley_persistence::error::PublishError;
use tokio::sync::mpsc;

/// Coordinator over two mock stores.
pub type MockCoordinator = DualStoreCoordinator<MockStore, MockStore>;

/// Coordinator configuration with the production defaults.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
}

/// Configuration with short timings for loop tests.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_retry(
            RetryConfig::default()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(10)),
        )
        .with_recovery(
            RecoveryConfig::default()
                .with_tick_interval(Duration::from_secs(1))
                .with_error_cooldown(Duration::from_secs(5)),
        )
        .with_connect_timeout(Duration::from_millis(500))
        .with_operation_timeout(Duration::from_millis(500))
}

/// Builds a coordinator over the given mocks.
pub fn coordinator(
    document: Option<MockStore>,
    relational: Option<MockStore>,
    config: CoordinatorConfig,
) -> Arc<MockCoordinator> {
    Arc::new(DualStoreCoordinator::new(document, relational, config))
}

/// Builds a coordinator whose notifications are captured on a channel.
pub fn coordinator_with_channel(
    document: Option<MockStore>,
    relational: Option<MockStore>,
    config: CoordinatorConfig,
) -> (Arc<MockCoordinator>, mpsc::Receiver<(String, Notification)>) {
    let (publisher, rx) = ChannelPublisher::new(64);
    let coordinator =
        DualStoreCoordinator::new(document, relational, config).with_publisher(Arc::new(publisher));
    (Arc::new(coordinator), rx)
}

/// Publisher whose deliveries never complete.
#[derive(Debug, Default)]
pub struct HungPublisher;

#[async_trait]
impl NotificationPublisher for HungPublisher {
    async fn publish(&self, _topic: &str, _notification: Notification) -> Result<(), PublishError> {
        std::future::pending().await
    }
}

/// Builds a coordinator with both mock stores and connects them.
pub async fn connected_pair() -> (Arc<MockCoordinator>, MockStore, MockStore) {
    let document = MockStore::new(StoreKind::Document);
    let relational = MockStore::new(StoreKind::Relational);
    let coordinator = coordinator(
        Some(document.clone()),
        Some(relational.clone()),
        fast_config(),
    );
    assert!(coordinator.connect_all().await);
    (coordinator, document, relational)
}

/// Drains every notification currently queued on the channel.
pub fn drain(rx: &mut mpsc::Receiver<(String, Notification)>) -> Vec<(String, Notification)> {
    let mut notifications = Vec::new();
    while let Ok(item) = rx.try_recv() {
        notifications.push(item);
    }
    notifications
}

/// Recovery notifications currently queued on the channel, in order.
pub fn recovery_events(
    rx: &mut mpsc::Receiver<(String, Notification)>,
) -> Vec<parley_persistence::core::RecoveryNotification> {
    drain(rx)
        .into_iter()
        .filter_map(|(topic, notification)| match notification {
            Notification::Recovery(event) => {
                assert_eq!(topic, parley_persistence::core::RECOVERY_TOPIC);
                Some(event)
            }
            _ => None,
        })
        .collect()
}

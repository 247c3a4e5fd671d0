//! Notifications emitted by the coordinator.
//!
//! The coordinator announces recovery attempts and transaction outcomes
//! through a [`NotificationPublisher`]. Delivery is never assumed: publish
//! failures are logged by the coordinator and otherwise ignored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::PublishError;

use super::backend::StoreKind;
use super::transaction::TransactionOutcome;

/// Topic for [`RecoveryNotification`]s.
pub const RECOVERY_TOPIC: &str = "persistence.recovery";

/// Topic for [`TransactionOutcome`]s.
pub const TRANSACTION_TOPIC: &str = "persistence.transaction";

/// Result of one reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryOutcome {
    /// The store is connected again.
    Success,
    /// The attempt failed; the store stays disconnected.
    Failure,
}

/// Announces a reconnection attempt for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryNotification {
    /// Store the attempt was made for.
    pub store: StoreKind,
    /// Whether the attempt reconnected the store.
    pub outcome: RecoveryOutcome,
    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
    /// True when triggered on demand rather than by the recovery loop.
    pub manual: bool,
}

impl RecoveryNotification {
    /// Creates a notification stamped with the current time.
    pub fn new(store: StoreKind, outcome: RecoveryOutcome, manual: bool) -> Self {
        Self {
            store,
            outcome,
            attempted_at: Utc::now(),
            manual,
        }
    }

    /// Overrides the attempt timestamp.
    pub fn with_attempted_at(mut self, attempted_at: DateTime<Utc>) -> Self {
        self.attempted_at = attempted_at;
        self
    }
}

/// Payload of a published notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    /// A reconnection attempt.
    Recovery(RecoveryNotification),
    /// A cross-store transaction outcome.
    Transaction(TransactionOutcome),
}

/// Sink for coordinator notifications.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publishes a notification on a topic.
    async fn publish(&self, topic: &str, notification: Notification) -> Result<(), PublishError>;
}

/// Publisher that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl NotificationPublisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _notification: Notification) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Publisher that writes each notification to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl NotificationPublisher for TracingPublisher {
    async fn publish(&self, topic: &str, notification: Notification) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&notification).map_err(|e| PublishError::Failed {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;
        info!(topic = %topic, payload = %payload, "Notification");
        Ok(())
    }
}

/// Publisher that forwards notifications into a tokio channel.
///
/// Useful for wiring the coordinator into an in-process event bus.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<(String, Notification)>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<(String, Notification)>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationPublisher for ChannelPublisher {
    async fn publish(&self, topic: &str, notification: Notification) -> Result<(), PublishError> {
        self.sender
            .send((topic.to_string(), notification))
            .await
            .map_err(|_| PublishError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let notification = Notification::Recovery(RecoveryNotification::new(
            StoreKind::Document,
            RecoveryOutcome::Success,
            true,
        ));
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["type"], "recovery");
        assert_eq!(json["payload"]["store"], "document");
        assert_eq!(json["payload"]["outcome"], "success");
        assert_eq!(json["payload"]["manual"], true);
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let notification = Notification::Transaction(TransactionOutcome::unavailable());

        publisher
            .publish(TRANSACTION_TOPIC, notification.clone())
            .await
            .unwrap();

        let (topic, received) = rx.recv().await.unwrap();
        assert_eq!(topic, TRANSACTION_TOPIC);
        assert_eq!(received, notification);
    }

    #[tokio::test]
    async fn test_channel_publisher_closed() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);

        let result = publisher
            .publish(
                RECOVERY_TOPIC,
                Notification::Recovery(RecoveryNotification::new(
                    StoreKind::Relational,
                    RecoveryOutcome::Failure,
                    false,
                )),
            )
            .await;
        assert!(matches!(result, Err(PublishError::Closed)));
    }
}

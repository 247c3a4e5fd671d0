//! Store abstractions shared by the drivers and the coordinator.
//!
//! - [`backend`] - [`StoreKind`] and the [`StoreBackend`] driver trait
//! - [`transaction`] - cross-store [`TransactionRequest`]s and their outcomes
//! - [`notification`] - recovery and transaction notifications

pub mod backend;
pub mod notification;
pub mod transaction;

pub use backend::{StoreBackend, StoreKind};
pub use notification::{
    ChannelPublisher, NoopPublisher, Notification, NotificationPublisher, RECOVERY_TOPIC,
    RecoveryNotification, RecoveryOutcome, TRANSACTION_TOPIC, TracingPublisher,
};
pub use transaction::{StoreOperation, TransactionOutcome, TransactionRequest};

//! Error types for the persistence layer.
//!
//! Errors are split by the layer that produces them: connection supervision,
//! cross-store transactions, the store drivers themselves, and notification
//! delivery. [`StorageError`] wraps all of them for callers that only need a
//! single error type.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::core::StoreKind;

/// The primary error type for all persistence operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection supervision errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Cross-store transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Store driver errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true if the error means a store is temporarily unreachable.
    ///
    /// Callers use this to report "temporarily unavailable" instead of failing hard.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StorageError::Connection(ConnectionError::ConfigurationMissing { .. }) => false,
            StorageError::Connection(_) => true,
            StorageError::Transaction(TransactionError::Unavailable) => true,
            StorageError::Backend(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors related to establishing and holding store connections.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The store was never configured. This is a normal degraded mode.
    #[error("{store} store is not configured")]
    ConfigurationMissing { store: StoreKind },

    /// The store is configured but could not be reached.
    #[error("{store} store unavailable after {attempts} attempt(s): {message}")]
    Unavailable {
        store: StoreKind,
        attempts: u32,
        message: String,
    },

    /// An accessor was called while the store is disconnected.
    #[error("{store} store is not connected")]
    NotConnected { store: StoreKind },
}

/// Errors related to cross-store transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Neither store was connected when the transaction was requested.
    #[error("no store is connected; transaction not attempted")]
    Unavailable,

    /// One store committed while the other failed.
    #[error("{committed} store committed but {failed} store failed: {message}")]
    PartialFailure {
        committed: StoreKind,
        failed: StoreKind,
        message: String,
    },

    /// The compensating action on the committed store failed.
    #[error("compensation failed on {store} store: {message}")]
    CompensationFailed { store: StoreKind, message: String },

    /// A transaction step exceeded its timeout.
    #[error("{store} transaction step timed out after {timeout_ms}ms")]
    Timeout { store: StoreKind, timeout_ms: u64 },

    /// The native transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },
}

/// Errors originating from a store driver.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the store failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The store is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// An operation against the store timed out.
    #[error("{operation} on {backend_name} timed out after {timeout_ms}ms")]
    Timeout {
        backend_name: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// The connection parameters are unusable.
    #[error("invalid configuration for {backend_name}: {message}")]
    InvalidConfiguration {
        backend_name: String,
        message: String,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackendError {
    /// Returns true for failures that are expected while a store is down.
    ///
    /// The recovery loop retries transient failures on its normal tick and
    /// backs off for a longer cooldown on anything else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectionFailed { .. }
                | BackendError::Unavailable { .. }
                | BackendError::Timeout { .. }
                | BackendError::PoolExhausted { .. }
        )
    }
}

/// Errors raised while delivering a notification.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The publisher's downstream is gone.
    #[error("notification channel closed")]
    Closed,

    /// Publishing exceeded its timeout.
    #[error("publishing to {topic} timed out after {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },

    /// Any other delivery failure.
    #[error("failed to publish to {topic}: {message}")]
    Failed { topic: String, message: String },
}

/// Result type alias for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for store driver operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.into())
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for BackendError {
    fn from(_err: r2d2::Error) -> Self {
        BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Backend(err.into())
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for BackendError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let transient = matches!(
            *err.kind,
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
                | ErrorKind::DnsResolve { .. }
        );
        let misconfigured = matches!(
            *err.kind,
            ErrorKind::InvalidArgument { .. } | ErrorKind::Authentication { .. }
        );

        if transient {
            BackendError::ConnectionFailed {
                backend_name: "mongodb".to_string(),
                message: err.to_string(),
            }
        } else if misconfigured {
            BackendError::InvalidConfiguration {
                backend_name: "mongodb".to_string(),
                message: err.to_string(),
            }
        } else {
            BackendError::Internal {
                backend_name: "mongodb".to_string(),
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Backend(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_errors_are_unavailable_only_when_nothing_ran() {
        let cases = [
            TransactionError::Unavailable,
            TransactionError::PartialFailure {
                committed: StoreKind::Document,
                failed: StoreKind::Relational,
                message: "boom".to_string(),
            },
            TransactionError::CompensationFailed {
                store: StoreKind::Document,
                message: "boom".to_string(),
            },
            TransactionError::Timeout {
                store: StoreKind::Relational,
                timeout_ms: 100,
            },
            TransactionError::RolledBack {
                reason: "boom".to_string(),
            },
        ];

        for err in cases {
            // Exhaustive: every variant must be one the coordinator produces.
            let expected = match &err {
                TransactionError::Unavailable => true,
                TransactionError::PartialFailure { .. }
                | TransactionError::CompensationFailed { .. }
                | TransactionError::Timeout { .. }
                | TransactionError::RolledBack { .. } => false,
            };
            assert_eq!(StorageError::from(err).is_unavailable(), expected);
        }
    }

    #[test]
    fn test_connection_error_display() {
        let err = StorageError::Connection(ConnectionError::NotConnected {
            store: StoreKind::Document,
        });
        assert_eq!(err.to_string(), "document store is not connected");

        let err = ConnectionError::Unavailable {
            store: StoreKind::Relational,
            attempts: 1,
            message: "disk I/O error".to_string(),
        };
        assert!(err.to_string().contains("after 1 attempt(s)"));
    }

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::PartialFailure {
            committed: StoreKind::Document,
            failed: StoreKind::Relational,
            message: "constraint violation".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "document store committed but relational store failed: constraint violation"
        );
        assert!(
            TransactionError::Unavailable
                .to_string()
                .contains("not attempted")
        );
    }

    #[test]
    fn test_backend_error_is_transient() {
        let err = BackendError::ConnectionFailed {
            backend_name: "mongodb".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.is_transient());

        let err = BackendError::InvalidConfiguration {
            backend_name: "mongodb".to_string(),
            message: "bad URI".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_storage_error_is_unavailable() {
        let missing: StorageError = ConnectionError::ConfigurationMissing {
            store: StoreKind::Document,
        }
        .into();
        assert!(!missing.is_unavailable());

        let not_connected: StorageError = ConnectionError::NotConnected {
            store: StoreKind::Relational,
        }
        .into();
        assert!(not_connected.is_unavailable());

        let unavailable: StorageError = TransactionError::Unavailable.into();
        assert!(unavailable.is_unavailable());
    }

    #[test]
    fn test_storage_error_from_serde() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let storage_err: StorageError = err.into();
        assert!(matches!(
            storage_err,
            StorageError::Backend(BackendError::SerializationError { .. })
        ));
    }
}

//! Health monitoring for both stores.
//!
//! Probes run in the caller's task, are bounded by `health.timeout` per store
//! and never change connection state: a failed probe is advisory. A store
//! that is not connected reports unhealthy without any I/O.
//!
//! # Example
//!
//! ```ignore
//! let report = coordinator.check_health().await;
//! if !report.document {
//!     // document-backed features report "temporarily unavailable"
//! }
//!
//! // Detailed report for an HTTP health endpoint
//! let response = coordinator.health_check_response().await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{StoreBackend, StoreKind};

use super::DualStoreCoordinator;
use super::state::StoreStatus;

/// Result of probing one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The store answered.
    Healthy {
        /// Round-trip time in milliseconds.
        response_time_ms: u64,
    },
    /// The store answered with an error.
    Unhealthy {
        /// Error message.
        error: String,
    },
    /// The probe exceeded its timeout.
    Timeout,
    /// No live connection; nothing was sent.
    NotConnected,
}

impl ProbeResult {
    /// Returns true if the store answered successfully.
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy { .. })
    }

    fn details(&self) -> Option<String> {
        match self {
            ProbeResult::Healthy { .. } => None,
            ProbeResult::Unhealthy { error } => Some(error.clone()),
            ProbeResult::Timeout => Some("health check timed out".to_string()),
            ProbeResult::NotConnected => Some("not connected".to_string()),
        }
    }
}

/// Per-store liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Document store answered its probe.
    pub document: bool,
    /// Relational store answered its probe.
    pub relational: bool,
}

impl HealthReport {
    /// Returns the liveness of one store.
    pub fn get(&self, store: StoreKind) -> bool {
        match store {
            StoreKind::Document => self.document,
            StoreKind::Relational => self.relational,
        }
    }

    /// Returns true if both stores are healthy.
    pub fn all_healthy(&self) -> bool {
        self.document && self.relational
    }
}

/// Health check response for HTTP or CLI surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Overall status: "healthy", "degraded" or "unavailable".
    pub status: String,

    /// Status of each store, keyed by store name.
    pub components: BTreeMap<String, ComponentHealth>,

    /// Timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Health of one store.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Status: "healthy", "unhealthy" or "unconfigured".
    pub status: String,

    /// Connection parameters were supplied.
    pub configured: bool,

    /// A live handle is held.
    pub connected: bool,

    /// Probe error or last connection error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Probe round-trip time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    /// Failed connection attempts since the last success.
    pub consecutive_failures: u32,

    /// When the last connection attempt started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    fn new(status: StoreStatus, probe: &ProbeResult) -> Self {
        let label = if !status.configured {
            "unconfigured"
        } else if probe.is_healthy() {
            "healthy"
        } else {
            "unhealthy"
        };

        let response_time_ms = match probe {
            ProbeResult::Healthy { response_time_ms } => Some(*response_time_ms),
            _ => None,
        };

        let details = if status.configured {
            probe
                .details()
                .map(|probe_error| match &status.last_error {
                    Some(last) if !status.connected => format!("{}: {}", probe_error, last),
                    _ => probe_error,
                })
        } else {
            None
        };

        Self {
            status: label.to_string(),
            configured: status.configured,
            connected: status.connected,
            details,
            response_time_ms,
            consecutive_failures: status.consecutive_failures,
            last_attempt_at: status.last_attempt_at,
        }
    }
}

impl HealthCheckResponse {
    fn new(components: BTreeMap<String, ComponentHealth>) -> Self {
        let configured: Vec<_> = components.values().filter(|c| c.configured).collect();
        let healthy = configured.iter().filter(|c| c.status == "healthy").count();

        let status = if configured.is_empty() {
            "degraded"
        } else if healthy == configured.len() {
            "healthy"
        } else if healthy > 0 {
            "degraded"
        } else {
            "unavailable"
        };

        Self {
            status: status.to_string(),
            components,
            timestamp: Utc::now(),
        }
    }

    /// Returns true if every configured store is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl<D: StoreBackend, R: StoreBackend> DualStoreCoordinator<D, R> {
    /// Probes one store.
    pub async fn probe(&self, store: StoreKind) -> ProbeResult {
        self.slot(store).probe(self.config.health.timeout).await
    }

    /// Probes both stores concurrently.
    ///
    /// A store that is not connected reports `false` without any I/O.
    pub async fn check_health(&self) -> HealthReport {
        let (document, relational) = tokio::join!(
            self.probe(StoreKind::Document),
            self.probe(StoreKind::Relational),
        );

        HealthReport {
            document: document.is_healthy(),
            relational: relational.is_healthy(),
        }
    }

    /// Probes both stores and combines the results with their connection state.
    pub async fn health_check_response(&self) -> HealthCheckResponse {
        let (document, relational) = tokio::join!(
            self.probe(StoreKind::Document),
            self.probe(StoreKind::Relational),
        );

        let components = [
            (StoreKind::Document, document),
            (StoreKind::Relational, relational),
        ]
        .into_iter()
        .map(|(store, probe)| {
            (
                store.to_string(),
                ComponentHealth::new(self.status(store), &probe),
            )
        })
        .collect();

        HealthCheckResponse::new(components)
    }
}

//! Configuration types for the dual-store coordinator.
//!
//! Every field has a default, so an empty document deserializes into a
//! working (zero-persistence) configuration. Durations are written in
//! humantime notation (`"30s"`, `"1m 30s"`).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use parley_persistence::composite::{DocumentStoreConfig, PersistenceConfig, RelationalStoreConfig};
//!
//! let config = PersistenceConfig::default()
//!     .with_document(DocumentStoreConfig::new("mongodb://localhost:27017", "parley"))
//!     .with_relational(RelationalStoreConfig::new("./data/parley.db"));
//!
//! assert_eq!(config.coordinator.retry.max_attempts, 5);
//! assert_eq!(config.coordinator.recovery.tick_interval, Duration::from_secs(30));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level persistence configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Document store parameters. `None` leaves the store unconfigured.
    #[serde(default)]
    pub document: Option<DocumentStoreConfig>,

    /// Relational store parameters. `None` leaves the store unconfigured.
    #[serde(default)]
    pub relational: Option<RelationalStoreConfig>,

    /// Coordinator behaviour.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl PersistenceConfig {
    /// Configures the document store.
    pub fn with_document(mut self, document: DocumentStoreConfig) -> Self {
        self.document = Some(document);
        self
    }

    /// Configures the relational store.
    pub fn with_relational(mut self, relational: RelationalStoreConfig) -> Self {
        self.relational = Some(relational);
        self
    }

    /// Replaces the coordinator configuration.
    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }
}

/// Connection parameters for the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Connection URI, including credentials.
    pub uri: String,

    /// Database name.
    pub database: String,

    /// Application name reported to the server.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_pool_size: u32,

    /// Minimum number of pooled connections.
    #[serde(default)]
    pub min_pool_size: u32,
}

fn default_app_name() -> String {
    "parley".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl DocumentStoreConfig {
    /// Creates a configuration for the given URI and database.
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            app_name: default_app_name(),
            max_pool_size: default_max_connections(),
            min_pool_size: 0,
        }
    }

    /// Sets the pool bounds.
    pub fn with_pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }
}

/// Connection parameters for the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalStoreConfig {
    /// Database file path, or `:memory:`.
    pub path: PathBuf,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// SQLite busy timeout.
    #[serde(with = "duration_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,

    /// Enable WAL mode so readers are not blocked during recovery windows.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_min_connections() -> u32 {
    1
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

impl RelationalStoreConfig {
    /// Creates a configuration for the given database path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout: default_busy_timeout(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }

    /// Creates a configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Returns true if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// Sets the maximum number of connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Coordinator behaviour: retries, recovery, health and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Startup retry policy for the document store.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Background recovery loop settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Health probe settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Timeout for one connection attempt.
    #[serde(with = "duration_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Timeout for each transaction step (begin, execute, commit, rollback, compensate).
    #[serde(with = "duration_serde", default = "default_operation_timeout")]
    pub operation_timeout: Duration,

    /// Timeout for publishing one notification.
    #[serde(with = "duration_serde", default = "default_publish_timeout")]
    pub publish_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            recovery: RecoveryConfig::default(),
            health: HealthConfig::default(),
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

impl CoordinatorConfig {
    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the recovery loop settings.
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    /// Sets the health probe settings.
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// Sets the per-attempt connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-step transaction timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Exponential backoff policy for startup connection attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of connection attempts (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(with = "duration_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(with = "duration_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(16)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Returns the delay to wait before attempt `attempt` (1-based).
    ///
    /// The first attempt is immediate; later delays grow by
    /// `backoff_multiplier` and never exceed `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Background recovery loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Interval between recovery ticks.
    #[serde(with = "duration_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Wait after an unexpected error before the next tick.
    #[serde(with = "duration_serde", default = "default_error_cooldown")]
    pub error_cooldown: Duration,

    /// How long shutdown waits for the loops before aborting them.
    #[serde(with = "duration_serde", default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,

    /// Probe connected stores on each tick and log failures.
    #[serde(default = "default_true")]
    pub probe_connected: bool,
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_error_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(2)
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            error_cooldown: default_error_cooldown(),
            shutdown_grace: default_shutdown_grace(),
            probe_connected: true,
        }
    }
}

impl RecoveryConfig {
    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the error cooldown.
    pub fn with_error_cooldown(mut self, cooldown: Duration) -> Self {
        self.error_cooldown = cooldown;
        self
    }

    /// Enables or disables advisory probing of connected stores.
    pub fn with_probe_connected(mut self, enabled: bool) -> Self {
        self.probe_connected = enabled;
        self
    }
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout for one store's probe. A timeout reports the store unhealthy.
    #[serde(with = "duration_serde", default = "default_health_timeout")]
    pub timeout: Duration,
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: default_health_timeout(),
        }
    }
}

/// Serde adapter for humantime-formatted durations.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

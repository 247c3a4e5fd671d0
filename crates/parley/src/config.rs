//! Process configuration.
//!
//! Every option can be given on the command line or through the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PARLEY_MONGO_URI` | unset | Document store URI; unset runs without it |
//! | `PARLEY_MONGO_DATABASE` | parley | Document store database name |
//! | `PARLEY_MONGO_MAX_POOL` | 10 | Document store pool size |
//! | `PARLEY_SQLITE_PATH` | unset | Relational store file; unset runs without it |
//! | `PARLEY_SQLITE_MAX_POOL` | 10 | Relational store pool size |
//! | `PARLEY_CONNECT_ATTEMPTS` | 5 | Startup attempts for the document store |
//! | `PARLEY_BACKOFF_BASE` | 1s | First startup retry delay |
//! | `PARLEY_BACKOFF_MAX` | 16s | Largest startup retry delay |
//! | `PARLEY_CONNECT_TIMEOUT` | 5s | Timeout for one connection attempt |
//! | `PARLEY_RECOVERY_INTERVAL` | 30s | Recovery tick interval |
//! | `PARLEY_RECOVERY_COOLDOWN` | 60s | Wait after an unexpected recovery error |
//! | `PARLEY_HEALTH_TIMEOUT` | 5s | Health probe timeout |
//! | `PARLEY_OPERATION_TIMEOUT` | 30s | Timeout for one transaction step |
//! | `PARLEY_LOG_LEVEL` | info | Log level |

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use parley_persistence::composite::{
    CoordinatorConfig, DocumentStoreConfig, HealthConfig, PersistenceConfig, RecoveryConfig,
    RelationalStoreConfig, RetryConfig,
};

/// Command line and environment configuration for the parley process.
#[derive(Debug, Clone, Parser)]
#[command(name = "parley")]
#[command(about = "Parley chat-bot persistence coordinator")]
pub struct ServerConfig {
    /// Document store connection URI.
    #[arg(long, env = "PARLEY_MONGO_URI")]
    pub mongo_uri: Option<String>,

    /// Document store database name.
    #[arg(long, env = "PARLEY_MONGO_DATABASE", default_value = "parley")]
    pub mongo_database: String,

    /// Document store maximum pool size.
    #[arg(long, env = "PARLEY_MONGO_MAX_POOL", default_value = "10")]
    pub mongo_max_pool: u32,

    /// Relational store database file (`:memory:` for a private database).
    #[arg(long, env = "PARLEY_SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// Relational store maximum pool size.
    #[arg(long, env = "PARLEY_SQLITE_MAX_POOL", default_value = "10")]
    pub sqlite_max_pool: u32,

    /// Startup connection attempts for the document store.
    #[arg(long, env = "PARLEY_CONNECT_ATTEMPTS", default_value = "5")]
    pub connect_attempts: u32,

    /// Delay before the first startup retry.
    #[arg(long, env = "PARLEY_BACKOFF_BASE", default_value = "1s", value_parser = humantime::parse_duration)]
    pub backoff_base: Duration,

    /// Upper bound on the startup retry delay.
    #[arg(long, env = "PARLEY_BACKOFF_MAX", default_value = "16s", value_parser = humantime::parse_duration)]
    pub backoff_max: Duration,

    /// Timeout for a single connection attempt.
    #[arg(long, env = "PARLEY_CONNECT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Interval between recovery ticks.
    #[arg(long, env = "PARLEY_RECOVERY_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub recovery_interval: Duration,

    /// Wait after an unexpected recovery error.
    #[arg(long, env = "PARLEY_RECOVERY_COOLDOWN", default_value = "60s", value_parser = humantime::parse_duration)]
    pub recovery_cooldown: Duration,

    /// Timeout for one health probe.
    #[arg(long, env = "PARLEY_HEALTH_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub health_timeout: Duration,

    /// Timeout for one transaction step.
    #[arg(long, env = "PARLEY_OPERATION_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub operation_timeout: Duration,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PARLEY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Connect, print a health report as JSON, and exit.
    #[arg(long)]
    pub check: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mongo_uri: None,
            mongo_database: "parley".to_string(),
            mongo_max_pool: 10,
            sqlite_path: None,
            sqlite_max_pool: 10,
            connect_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(16),
            connect_timeout: Duration::from_secs(5),
            recovery_interval: Duration::from_secs(30),
            recovery_cooldown: Duration::from_secs(60),
            health_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            check: false,
        }
    }
}

impl ServerConfig {
    /// Validates the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Some(uri) = &self.mongo_uri {
            if uri.trim().is_empty() {
                errors.push("Mongo URI cannot be empty".to_string());
            }
            if self.mongo_database.trim().is_empty() {
                errors.push("Mongo database name cannot be empty".to_string());
            }
            if self.mongo_max_pool == 0 {
                errors.push("Mongo pool size cannot be 0".to_string());
            }
        }

        if let Some(path) = &self.sqlite_path {
            if path.as_os_str().is_empty() {
                errors.push("SQLite path cannot be empty".to_string());
            }
            if self.sqlite_max_pool == 0 {
                errors.push("SQLite pool size cannot be 0".to_string());
            }
        }

        if self.connect_attempts == 0 {
            errors.push("Connect attempts cannot be 0".to_string());
        }

        if self.backoff_base > self.backoff_max {
            errors.push("Backoff base cannot exceed backoff max".to_string());
        }

        for (name, value) in [
            ("Connect timeout", self.connect_timeout),
            ("Recovery interval", self.recovery_interval),
            ("Health timeout", self.health_timeout),
            ("Operation timeout", self.operation_timeout),
        ] {
            if value.is_zero() {
                errors.push(format!("{} cannot be 0", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the persistence configuration.
    pub fn persistence_config(&self) -> PersistenceConfig {
        let retry = RetryConfig {
            max_attempts: self.connect_attempts,
            initial_delay: self.backoff_base,
            max_delay: self.backoff_max,
            ..Default::default()
        };

        let recovery = RecoveryConfig::default()
            .with_tick_interval(self.recovery_interval)
            .with_error_cooldown(self.recovery_cooldown);

        let coordinator = CoordinatorConfig::default()
            .with_retry(retry)
            .with_recovery(recovery)
            .with_health(HealthConfig {
                timeout: self.health_timeout,
            })
            .with_connect_timeout(self.connect_timeout)
            .with_operation_timeout(self.operation_timeout);

        let mut config = PersistenceConfig {
            coordinator,
            ..Default::default()
        };

        if let Some(uri) = &self.mongo_uri {
            config = config.with_document(
                DocumentStoreConfig::new(uri.clone(), self.mongo_database.clone())
                    .with_pool_size(0, self.mongo_max_pool),
            );
        }

        if let Some(path) = &self.sqlite_path {
            config = config.with_relational(
                RelationalStoreConfig::new(path.clone())
                    .with_max_connections(self.sqlite_max_pool),
            );
        }

        config
    }
}

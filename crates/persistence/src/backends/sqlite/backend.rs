//! SQLite backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::composite::RelationalStoreConfig;
use crate::core::{StoreBackend, StoreKind};
use crate::error::{BackendError, BackendResult};

use super::SqliteTransaction;

/// Handle returned by [`SqliteStore::connect`](StoreBackend::connect).
pub type SqliteHandle = Pool<SqliteConnectionManager>;

const BACKEND_NAME: &str = "sqlite";

/// Relational store backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: RelationalStoreConfig,
}

impl SqliteStore {
    /// Creates a store for the given configuration. Nothing is opened yet.
    pub fn new(config: RelationalStoreConfig) -> Self {
        Self { config }
    }

    /// Creates a store over a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(RelationalStoreConfig::in_memory())
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &RelationalStoreConfig {
        &self.config
    }

    fn build_pool(config: &RelationalStoreConfig) -> BackendResult<SqliteHandle> {
        let is_memory = config.is_memory();
        let busy_timeout = config.busy_timeout;
        let enable_foreign_keys = config.enable_foreign_keys;
        let enable_wal = config.enable_wal && !is_memory;

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.path)
        }
        .with_init(move |conn| {
            configure_connection(conn, busy_timeout, enable_foreign_keys, enable_wal)
        });

        let max_size = if is_memory {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(busy_timeout.max(Duration::from_secs(1)))
            .build(manager)
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(pool)
    }
}

/// Applies per-connection settings when the pool opens a connection.
fn configure_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    enable_foreign_keys: bool,
    enable_wal: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;

    if enable_foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
    }

    if enable_wal {
        // journal_mode returns a row, so it cannot go through execute_batch.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    }

    Ok(())
}

fn select_one(pool: &SqliteHandle) -> BackendResult<()> {
    let conn = pool.get()?;
    let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    if one != 1 {
        return Err(BackendError::Unavailable {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("unexpected ping result {}", one),
        });
    }
    Ok(())
}

/// Runs blocking SQLite work off the async runtime.
async fn blocking<T, F>(work: F) -> BackendResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BackendResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BackendError::Internal {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("blocking task failed: {}", e),
            source: Some(Box::new(e)),
        })?
}

#[async_trait]
impl StoreBackend for SqliteStore {
    type Handle = SqliteHandle;
    type Transaction = SqliteTransaction;

    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn connect(&self) -> BackendResult<Self::Handle> {
        let config = self.config.clone();
        let pool = blocking(move || {
            let pool = Self::build_pool(&config)?;
            select_one(&pool)?;
            Ok(pool)
        })
        .await?;

        info!(
            path = %self.config.path.display(),
            max_connections = pool.max_size(),
            "Opened SQLite database"
        );
        Ok(pool)
    }

    async fn ping(&self, handle: &Self::Handle) -> BackendResult<()> {
        let pool = handle.clone();
        blocking(move || select_one(&pool)).await
    }

    async fn begin(&self, handle: &Self::Handle) -> BackendResult<Self::Transaction> {
        let pool = handle.clone();
        blocking(move || SqliteTransaction::begin(pool.get()?)).await
    }

    async fn commit(&self, tx: Self::Transaction) -> BackendResult<()> {
        blocking(move || tx.commit()).await
    }

    async fn rollback(&self, tx: Self::Transaction) -> BackendResult<()> {
        blocking(move || tx.rollback()).await
    }

    async fn close(&self, handle: Self::Handle) {
        if !self.config.enable_wal || self.config.is_memory() {
            return;
        }

        // Fold the WAL back into the main file before the pool goes away.
        let result = blocking(move || {
            let conn = handle.get()?;
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            Ok(())
        })
        .await;

        match result {
            Ok(()) => debug!("Checkpointed SQLite WAL"),
            Err(e) => warn!(error = %e, "WAL checkpoint on close failed"),
        }
    }
}

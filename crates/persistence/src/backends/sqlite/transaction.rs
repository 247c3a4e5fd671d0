//! Transaction support for the SQLite backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle};

use crate::error::{BackendError, BackendResult, StorageResult};

type SharedConnection = Arc<Mutex<PooledConnection<SqliteConnectionManager>>>;

/// A SQLite transaction holding one pooled connection.
///
/// Statements run through [`run`](Self::run), which moves the work onto the
/// blocking pool. Dropping the future returned by `run` (for example when a
/// step timeout fires) interrupts the statement in progress.
pub struct SqliteTransaction {
    conn: SharedConnection,
    interrupt: InterruptHandle,
    active: bool,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("active", &self.active)
            .finish()
    }
}

/// Interrupts the running statement unless disarmed first.
struct InterruptOnDrop<'a> {
    interrupt: &'a InterruptHandle,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for InterruptOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::Release);
            self.interrupt.interrupt();
        }
    }
}

impl SqliteTransaction {
    /// Starts a write transaction on the given connection.
    pub(crate) fn begin(conn: PooledConnection<SqliteConnectionManager>) -> BackendResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let interrupt = conn.get_interrupt_handle();
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            active: true,
        })
    }

    /// Runs `work` against the transaction's connection on the blocking pool.
    ///
    /// If the returned future is dropped before it completes, the statement
    /// in progress is interrupted and fails with `SQLITE_INTERRUPT`.
    pub async fn run<T, F>(&mut self, work: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut guard = InterruptOnDrop {
            interrupt: &self.interrupt,
            cancelled: Arc::clone(&cancelled),
            armed: true,
        };

        let task = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            // An interrupt only reaches statements that are already running.
            if cancelled.load(Ordering::Acquire) {
                return Err(BackendError::QueryError {
                    message: "statement cancelled before it started".to_string(),
                }
                .into());
            }
            work(&conn)
        });

        let result = task.await;
        guard.armed = false;

        result.map_err(|e| BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: format!("blocking task failed: {}", e),
            source: Some(Box::new(e)),
        })?
    }

    /// Whether the transaction is still open.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn commit(mut self) -> BackendResult<()> {
        // On failure `active` stays set and Drop issues the rollback.
        self.conn.lock().execute_batch("COMMIT")?;
        self.active = false;
        Ok(())
    }

    pub(crate) fn rollback(mut self) -> BackendResult<()> {
        self.active = false;
        let conn = self.conn.lock();
        // An interrupted write may already have been rolled back by SQLite.
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.active {
            let conn = self.conn.lock();
            if !conn.is_autocommit() {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }
    }
}

//! SQLite relational store tests.
//!
//! These run the coordinator against a real SQLite database in a temporary
//! directory, with a mock document store on the other side.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::params;
use tempfile::TempDir;

use parley_persistence::backends::sqlite::{SqliteHandle, SqliteStore, SqliteTransaction};
use parley_persistence::composite::{CoordinatorConfig, DualStoreCoordinator, RelationalStoreConfig};
use parley_persistence::core::{StoreKind, StoreOperation, TransactionRequest};
use parley_persistence::error::{BackendError, StorageResult};

use common::*;

type SqliteCoordinator = DualStoreCoordinator<MockStore, SqliteStore>;

/// Inserts a user row; undone by deleting it.
struct InsertUser {
    id: i64,
    fail_after_insert: bool,
}

#[async_trait]
impl StoreOperation<SqliteStore> for InsertUser {
    async fn execute(&self, tx: &mut SqliteTransaction) -> StorageResult<()> {
        let id = self.id;
        let fail_after_insert = self.fail_after_insert;
        tx.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, name) VALUES (?1, ?2)",
                params![id, format!("user-{}", id)],
            )?;
            if fail_after_insert {
                return Err(BackendError::QueryError {
                    message: "validation failed after insert".to_string(),
                }
                .into());
            }
            Ok(())
        })
        .await
    }

    async fn compensate(&self, pool: &SqliteHandle) -> StorageResult<()> {
        pool.get()?
            .execute("DELETE FROM users WHERE id = ?1", [self.id])?;
        Ok(())
    }
}

/// Inserts a user, then runs a recursive count that takes far longer than any step timeout.
struct InsertThenCount {
    id: i64,
    rows: i64,
}

#[async_trait]
impl StoreOperation<SqliteStore> for InsertThenCount {
    async fn execute(&self, tx: &mut SqliteTransaction) -> StorageResult<()> {
        let (id, rows) = (self.id, self.rows);
        tx.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, name) VALUES (?1, ?2)",
                params![id, "slow"],
            )?;
            let _count: i64 = conn.query_row(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < ?1) \
                 SELECT COUNT(*) FROM c",
                [rows],
                |row| row.get(0),
            )?;
            Ok(())
        })
        .await
    }
}

fn database_config(dir: &TempDir) -> RelationalStoreConfig {
    RelationalStoreConfig::new(dir.path().join("parley.db")).with_max_connections(4)
}

async fn create_coordinator(dir: &TempDir) -> (Arc<SqliteCoordinator>, MockStore) {
    create_coordinator_with(dir, fast_config()).await
}

async fn create_coordinator_with(
    dir: &TempDir,
    config: CoordinatorConfig,
) -> (Arc<SqliteCoordinator>, MockStore) {
    let document = MockStore::new(StoreKind::Document);
    let coordinator = Arc::new(DualStoreCoordinator::new(
        Some(document.clone()),
        Some(SqliteStore::new(database_config(dir))),
        config,
    ));
    assert!(coordinator.connect_all().await);

    coordinator
        .get_relational_store()
        .unwrap()
        .get()
        .unwrap()
        .execute_batch("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();

    (coordinator, document)
}

fn user_count(coordinator: &SqliteCoordinator) -> i64 {
    coordinator
        .get_relational_store()
        .unwrap()
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn test_sqlite_store_connects_and_probes() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _document) = create_coordinator(&dir).await;

    let report = coordinator.check_health().await;
    assert!(report.relational);

    coordinator.close_all().await;
}

#[tokio::test]
async fn test_sqlite_commit_is_visible() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _document) = create_coordinator(&dir).await;

    let outcome = coordinator
        .run_cross_store_transaction(TransactionRequest::new().with_relational(InsertUser {
            id: 1,
            fail_after_insert: false,
        }))
        .await;

    assert!(outcome.overall_success);
    assert_eq!(user_count(&coordinator), 1);
    coordinator.close_all().await;
}

#[tokio::test]
async fn test_sqlite_operation_error_rolls_back_native_transaction() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _document) = create_coordinator(&dir).await;

    let outcome = coordinator
        .run_cross_store_transaction(TransactionRequest::new().with_relational(InsertUser {
            id: 1,
            fail_after_insert: true,
        }))
        .await;

    assert!(!outcome.relational_success);
    assert_eq!(user_count(&coordinator), 0);
    coordinator.close_all().await;
}

#[tokio::test]
async fn test_sqlite_commit_is_compensated_when_document_fails() {
    let dir = TempDir::new().unwrap();
    let (coordinator, _document) = create_coordinator(&dir).await;

    let (doc_op, _) = RecordingOp::failing("conversation-1");
    let outcome = coordinator
        .run_cross_store_transaction(
            TransactionRequest::new()
                .with_document(doc_op)
                .with_relational(InsertUser {
                    id: 7,
                    fail_after_insert: false,
                }),
        )
        .await;

    assert!(outcome.relational_committed);
    assert!(outcome.rollback_attempted);
    assert_eq!(user_count(&coordinator), 0);
    coordinator.close_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sqlite_slow_operation_times_out_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let config = fast_config().with_operation_timeout(Duration::from_millis(100));
    let (coordinator, _document) = create_coordinator_with(&dir, config).await;

    let started = Instant::now();
    let outcome = coordinator
        .run_cross_store_transaction(TransactionRequest::new().with_relational(InsertThenCount {
            id: 9,
            rows: 1_000_000_000,
        }))
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
    assert!(!outcome.relational_success);
    assert!(!outcome.relational_committed);
    let error = outcome.relational_error.as_deref().unwrap();
    assert!(error.contains("timed out"), "{}", error);

    // The interrupted connection goes back to the pool usable and empty.
    assert_eq!(user_count(&coordinator), 0);
    coordinator.close_all().await;
}

#[tokio::test]
async fn test_sqlite_data_survives_close_and_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (coordinator, _document) = create_coordinator(&dir).await;
        let outcome = coordinator
            .run_cross_store_transaction(TransactionRequest::new().with_relational(InsertUser {
                id: 3,
                fail_after_insert: false,
            }))
            .await;
        assert!(outcome.overall_success);
        coordinator.close_all().await;
    }

    let (coordinator, _document) = create_coordinator(&dir).await;
    assert_eq!(user_count(&coordinator), 1);
    coordinator.close_all().await;
}

#[tokio::test]
async fn test_in_memory_sqlite_store() {
    let coordinator: Arc<SqliteCoordinator> = Arc::new(DualStoreCoordinator::new(
        None,
        Some(SqliteStore::in_memory()),
        fast_config(),
    ));

    assert!(coordinator.connect_all().await);
    assert!(coordinator.is_connected(StoreKind::Relational));
    assert_eq!(coordinator.get_relational_store().unwrap().max_size(), 1);
    coordinator.close_all().await;
}

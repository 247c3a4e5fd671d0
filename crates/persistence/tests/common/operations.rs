//! Recording operations for cross-store transaction tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_persistence::core::StoreOperation;
use parley_persistence::error::{BackendError, StorageResult};

use super::mock::{MockHandle, MockStore, MockTransaction};

/// What an operation's `execute` should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

/// Shared view of what happened to a [`RecordingOp`].
#[derive(Debug, Default)]
pub struct OpLog {
    pub executions: AtomicU32,
    pub compensations: AtomicU32,
    pub compensated: Mutex<Vec<String>>,
}

impl OpLog {
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn compensations(&self) -> u32 {
        self.compensations.load(Ordering::SeqCst)
    }
}

/// Writes one record and undoes it by recording the compensation.
#[derive(Debug)]
pub struct RecordingOp {
    pub record: String,
    pub behavior: Behavior,
    pub compensation_fails: bool,
    pub log: Arc<OpLog>,
}

impl RecordingOp {
    pub fn new(record: &str, behavior: Behavior) -> (Self, Arc<OpLog>) {
        let log = Arc::new(OpLog::default());
        (
            Self {
                record: record.to_string(),
                behavior,
                compensation_fails: false,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    pub fn succeeding(record: &str) -> (Self, Arc<OpLog>) {
        Self::new(record, Behavior::Succeed)
    }

    pub fn failing(record: &str) -> (Self, Arc<OpLog>) {
        Self::new(record, Behavior::Fail)
    }

    pub fn with_failing_compensation(mut self) -> Self {
        self.compensation_fails = true;
        self
    }
}

#[async_trait]
impl StoreOperation<MockStore> for RecordingOp {
    async fn execute(&self, tx: &mut MockTransaction) -> StorageResult<()> {
        self.log.executions.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {
                tx.writes.push(self.record.clone());
                Ok(())
            }
            Behavior::Fail => Err(BackendError::QueryError {
                message: format!("constraint violated writing {}", self.record),
            }
            .into()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn compensate(&self, handle: &MockHandle) -> StorageResult<()> {
        self.log.compensations.fetch_add(1, Ordering::SeqCst);
        if self.compensation_fails {
            return Err(BackendError::QueryError {
                message: format!("could not delete {}", self.record),
            }
            .into());
        }

        handle.state.committed.lock().retain(|r| r != &self.record);
        self.log.compensated.lock().push(self.record.clone());
        Ok(())
    }
}

/// Operation relying on the default compensation.
#[derive(Debug)]
pub struct IrreversibleOp(pub String);

#[async_trait]
impl StoreOperation<MockStore> for IrreversibleOp {
    async fn execute(&self, tx: &mut MockTransaction) -> StorageResult<()> {
        tx.writes.push(self.0.clone());
        Ok(())
    }
}

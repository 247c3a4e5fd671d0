//! Scriptable mock store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_persistence::core::{StoreBackend, StoreKind};
use parley_persistence::error::{BackendError, BackendResult};
use tokio::time::{Instant, sleep};

/// Counters and switches shared between a [`MockStore`] and the test.
#[derive(Debug, Default)]
pub struct MockState {
    pub connect_calls: AtomicU32,
    pub in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
    pub ping_calls: AtomicU32,
    pub close_calls: AtomicU32,
    pub begin_calls: AtomicU32,
    pub commit_calls: AtomicU32,
    pub rollback_calls: AtomicU32,

    /// Connects and pings fail while set.
    pub down: AtomicBool,
    /// Connects fail with a non-transient error while set.
    pub broken: AtomicBool,
    /// The next N connects fail.
    pub fail_next_connects: AtomicU32,
    /// Commits fail while set.
    pub fail_commit: AtomicBool,

    pub connect_delay: Mutex<Duration>,
    pub ping_delay: Mutex<Duration>,
    pub connect_times: Mutex<Vec<Instant>>,

    /// Writes made durable by committed transactions.
    pub committed: Mutex<Vec<String>>,

    next_handle: AtomicU32,
}

/// Handle given out by a connected [`MockStore`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    pub id: u32,
    pub state: Arc<MockState>,
}

/// Transaction of a [`MockStore`]; writes become visible on commit.
#[derive(Debug, Default)]
pub struct MockTransaction {
    pub writes: Vec<String>,
}

/// In-memory [`StoreBackend`] with call counters and scripted failures.
#[derive(Debug, Clone)]
pub struct MockStore {
    kind: StoreKind,
    pub state: Arc<MockState>,
}

/// Decrements the in-flight counter even if the connect is cancelled.
struct InFlight<'a>(&'a MockState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockStore {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            state: Arc::new(MockState::default()),
        }
    }

    /// A store whose connects fail until [`set_down(false)`](Self::set_down).
    pub fn down(kind: StoreKind) -> Self {
        let store = Self::new(kind);
        store.set_down(true);
        store
    }

    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    pub fn set_broken(&self, broken: bool) {
        self.state.broken.store(broken, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.fail_next_connects.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.state.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = delay;
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        *self.state.ping_delay.lock() = delay;
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> u32 {
        self.state.ping_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn begin_calls(&self) -> u32 {
        self.state.begin_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> u32 {
        self.state.commit_calls.load(Ordering::SeqCst)
    }

    pub fn rollback_calls(&self) -> u32 {
        self.state.rollback_calls.load(Ordering::SeqCst)
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.connect_times.lock().clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state.committed.lock().clone()
    }

    fn unavailable(&self, message: &str) -> BackendError {
        BackendError::ConnectionFailed {
            backend_name: self.name().to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackend for MockStore {
    type Handle = MockHandle;
    type Transaction = MockTransaction;

    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> BackendResult<Self::Handle> {
        let state = &self.state;
        state.connect_calls.fetch_add(1, Ordering::SeqCst);
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(state);
        state.connect_times.lock().push(Instant::now());

        let delay = *state.connect_delay.lock();
        if !delay.is_zero() {
            sleep(delay).await;
        }

        if state.broken.load(Ordering::SeqCst) {
            return Err(BackendError::Internal {
                backend_name: self.name().to_string(),
                message: "driver panicked".to_string(),
                source: None,
            });
        }
        if state.down.load(Ordering::SeqCst) {
            return Err(self.unavailable("connection refused"));
        }
        let scripted = state
            .fail_next_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            return Err(self.unavailable("scripted failure"));
        }

        Ok(MockHandle {
            id: state.next_handle.fetch_add(1, Ordering::SeqCst) + 1,
            state: Arc::clone(state),
        })
    }

    async fn ping(&self, _handle: &Self::Handle) -> BackendResult<()> {
        self.state.ping_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.ping_delay.lock();
        if !delay.is_zero() {
            sleep(delay).await;
        }

        if self.state.down.load(Ordering::SeqCst) {
            return Err(self.unavailable("connection reset"));
        }
        Ok(())
    }

    async fn begin(&self, _handle: &Self::Handle) -> BackendResult<Self::Transaction> {
        self.state.begin_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.down.load(Ordering::SeqCst) {
            return Err(self.unavailable("connection reset"));
        }
        Ok(MockTransaction::default())
    }

    async fn commit(&self, tx: Self::Transaction) -> BackendResult<()> {
        self.state.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(BackendError::QueryError {
                message: "commit rejected".to_string(),
            });
        }
        self.state.committed.lock().extend(tx.writes);
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Transaction) -> BackendResult<()> {
        self.state.rollback_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _handle: Self::Handle) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

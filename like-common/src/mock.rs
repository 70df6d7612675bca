//! In-memory stand-ins for Redis and PostgreSQL, for tests that exercise the whole pipeline.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::event::EventKey;
use crate::queue::{LikeQueue, QueueError, QueueResult};
use crate::store::{CounterStore, StoreConnector, StoreError, StoreResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A FIFO queue in memory. Clones share the same entries.
#[derive(Clone)]
pub struct MemoryQueue {
    name: String,
    entries: Arc<Mutex<VecDeque<EventKey>>>,
    notify: Arc<Notify>,
    available: Arc<AtomicBool>,
    pop_timeout: Option<Duration>,
}

impl MemoryQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            entries: Default::default(),
            notify: Default::default(),
            available: Arc::new(AtomicBool::new(true)),
            pop_timeout: None,
        }
    }

    /// Make `blocking_pop` return `None` after waiting this long on an empty queue.
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = Some(timeout);
        self
    }

    /// Simulate the queue service going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Entries in the order they will be popped.
    pub fn entries(&self) -> Vec<EventKey> {
        lock(&self.entries).iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> QueueResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable(self.name.clone()))
        }
    }
}

#[async_trait]
impl LikeQueue for MemoryQueue {
    async fn push(&self, key: &EventKey) -> QueueResult<()> {
        self.check_available()?;
        lock(&self.entries).push_front(key.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn blocking_pop(&self) -> QueueResult<Option<EventKey>> {
        let deadline = self.pop_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let notified = self.notify.notified();

            self.check_available()?;
            if let Some(key) = lock(&self.entries).pop_back() {
                return Ok(Some(key));
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct StoreState {
    counts: HashMap<String, i64>,
    rejected: HashSet<String>,
    failures: VecDeque<StoreError>,
    increments: Vec<EventKey>,
}

/// A counter store in memory. Clones share the same counters.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every increment for `key` with a permanent error.
    pub fn reject(&self, key: &str) {
        lock(&self.state).rejected.insert(key.to_owned());
    }

    /// Fail the next operation, increment or count, whatever its key, with `error`.
    pub fn fail_next(&self, error: StoreError) {
        lock(&self.state).failures.push_back(error);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        lock(&self.state).counts.get(key).copied()
    }

    /// Every key an increment was attempted for, in order, including failed attempts.
    pub fn increments(&self) -> Vec<EventKey> {
        lock(&self.state).increments.clone()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &EventKey) -> StoreResult<()> {
        let mut state = lock(&self.state);
        state.increments.push(key.clone());

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        if state.rejected.contains(key.as_str()) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                reason: "rejected by test".to_owned(),
            });
        }

        *state.counts.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn count(&self, key: &EventKey) -> StoreResult<Option<i64>> {
        let mut state = lock(&self.state);

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        Ok(state.counts.get(key.as_str()).copied())
    }
}

/// Hands out a `MemoryCounterStore` once the simulated store is reachable.
#[derive(Clone)]
pub struct MemoryConnector {
    store: MemoryCounterStore,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl MemoryConnector {
    pub fn new(store: MemoryCounterStore) -> Self {
        Self {
            store,
            failures_left: Arc::new(AtomicUsize::new(0)),
            attempts: Default::default(),
        }
    }

    /// Fail the next `n` connection attempts.
    pub fn unreachable_for(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// When each connection attempt happened.
    pub fn attempts(&self) -> Vec<Instant> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryCounterStore;

    async fn connect(&self) -> StoreResult<MemoryCounterStore> {
        lock(&self.attempts).push(Instant::now());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable);
        }

        Ok(self.store.clone())
    }
}

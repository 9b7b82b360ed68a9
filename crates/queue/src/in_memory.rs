//! In-memory broker for tests and single-process development.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::broker::{BrokerError, QueueBroker};

/// In-memory list-per-topic broker.
///
/// - One mutex over all topics, one condvar for wakeups
/// - Pops wait on the condvar until their topic has an entry or the
///   timeout elapses
/// - Also records how many pushes each topic received (for assertions)
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, VecDeque<String>>,
    pushes: HashMap<String, u64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pushes ever received by `topic` (popped or not).
    pub fn push_count(&self, topic: &str) -> u64 {
        self.lock().pushes.get(topic).copied().unwrap_or(0)
    }

    /// Total pushes across all topics.
    pub fn total_pushes(&self) -> u64 {
        self.lock().pushes.values().sum()
    }

    /// Snapshot of the entries waiting on `topic`, head first.
    pub fn peek_all(&self, topic: &str) -> Vec<String> {
        self.lock()
            .topics
            .get(topic)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not take the broker down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueBroker for InMemoryBroker {
    fn push(&self, topic: &str, entry: String) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push_back(entry);
        *state.pushes.entry(topic.to_string()).or_default() += 1;
        drop(state);

        trace!(topic, "pushed entry");
        // Waiters may be blocked on different topics; wake them all.
        self.available.notify_all();
        Ok(())
    }

    fn pop(&self, topic: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if let Some(entry) = state.topics.get_mut(topic).and_then(VecDeque::pop_front) {
                return Ok(Some(entry));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn len(&self, topic: &str) -> Result<usize, BrokerError> {
        Ok(self.lock().topics.get(topic).map_or(0, VecDeque::len))
    }
}

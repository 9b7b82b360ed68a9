//! Result correlator: routes the shared result stream back to clients.
//!
//! One loop per dispatcher process. Each iteration:
//! 1. evicts registrations whose deadline passed and notifies their clients,
//!    at most once per poll interval
//! 2. pops one entry from the result topic (bounded wait)
//! 3. reads only its `job_id` and takes the matching registration
//! 4. forwards the raw entry, byte for byte, if the connection is still open
//!    (parking it on the registration if the client's ack has not gone out)
//!
//! Results without a registration (late, duplicate, or for a dispatcher that
//! restarted) are logged and discarded. Any single bad entry or broker error
//! is logged, followed by a short backoff, and the loop carries on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use sentinel_core::{ExpiryNotice, JobId, RESULT_TOPIC};
use sentinel_queue::{BrokerError, QueueBroker};

use crate::registry::{CorrelationRegistry, Delivery};
use crate::supervisor::{RetryPolicy, ShutdownSignal, SupervisedHandle, Supervisor};

#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("malformed result entry: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationOutcome {
    Idle,
    Delivered(JobId),
    /// Registration found but the client had gone away.
    Dropped(JobId),
    /// No registration for this job id.
    Miss(JobId),
}

/// The only part of a result the correlator looks at.
#[derive(Deserialize)]
struct RoutingKey {
    job_id: JobId,
}

#[derive(Debug, Default)]
pub struct CorrelatorStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    missed: AtomicU64,
    expired: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorrelatorStatsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub missed: u64,
    pub expired: u64,
    pub malformed: u64,
}

impl CorrelatorStats {
    pub fn snapshot(&self) -> CorrelatorStatsSnapshot {
        CorrelatorStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct ResultCorrelator<B> {
    broker: B,
    registry: Arc<CorrelationRegistry>,
    poll_interval: Duration,
    error_backoff: Duration,
    stats: Arc<CorrelatorStats>,
    last_sweep: Mutex<Option<Instant>>,
}

impl<B: QueueBroker> ResultCorrelator<B> {
    pub fn new(broker: B, registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            broker,
            registry,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_millis(500),
            stats: Arc::new(CorrelatorStats::default()),
            last_sweep: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    pub fn stats(&self) -> Arc<CorrelatorStats> {
        self.stats.clone()
    }

    /// A due sweep plus at most one routed result.
    pub fn run_once(&self) -> Result<CorrelationOutcome, CorrelatorError> {
        if self.sweep_due() {
            self.sweep_expired();
        }

        match self.broker.pop(RESULT_TOPIC, self.poll_interval)? {
            Some(raw) => self.route(raw),
            None => Ok(CorrelationOutcome::Idle),
        }
    }

    /// Deliver `raw` to whoever is waiting for its job id.
    pub fn route(&self, raw: String) -> Result<CorrelationOutcome, CorrelatorError> {
        let job_id = match serde_json::from_str::<RoutingKey>(&raw) {
            Ok(key) => key.job_id,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                return Err(CorrelatorError::Malformed(e.to_string()));
            }
        };

        let Some(registration) = self.registry.take(&job_id) else {
            self.stats.missed.fetch_add(1, Ordering::Relaxed);
            warn!(job_id = %job_id, "result for unknown job id; discarded");
            return Ok(CorrelationOutcome::Miss(job_id));
        };

        let connection_id = registration.connection.id();
        match registration.deliver(raw) {
            Ok(Delivery::Sent) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                info!(job_id = %job_id, connection_id = %connection_id, "result delivered");
                Ok(CorrelationOutcome::Delivered(job_id))
            }
            Ok(Delivery::Parked) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                info!(job_id = %job_id, connection_id = %connection_id, "result parked until acknowledgement");
                Ok(CorrelationOutcome::Delivered(job_id))
            }
            Ok(Delivery::Discarded) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = %job_id, connection_id = %connection_id, "dispatch was rolled back; result dropped");
                Ok(CorrelationOutcome::Dropped(job_id))
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = %job_id, connection_id = %connection_id, "client disconnected; result dropped");
                Ok(CorrelationOutcome::Dropped(job_id))
            }
        }
    }

    /// Evict expired registrations, notifying clients that are still open.
    pub fn sweep_expired(&self) -> usize {
        let expired = self.registry.take_expired(Utc::now());

        for (job_id, registration) in &expired {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            warn!(job_id = %job_id, connection_id = %registration.connection.id(), "job expired without a result");

            match serde_json::to_string(&ExpiryNotice::new(*job_id)) {
                Ok(text) => {
                    if registration.deliver(text).is_err() {
                        debug!(job_id = %job_id, "expired job's client already gone");
                    }
                }
                Err(e) => error!(job_id = %job_id, error = %e, "failed to encode expiry notice"),
            }
        }

        expired.len()
    }

    /// Whether a poll interval has passed since the last sweep.
    fn sweep_due(&self) -> bool {
        let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.poll_interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Loop until `shutdown` fires.
    pub fn run(&self, shutdown: &ShutdownSignal) -> Result<(), CorrelatorError> {
        info!(topic = RESULT_TOPIC, "result correlator started");

        while !shutdown.is_triggered() {
            if let Err(e) = self.run_once() {
                error!(error = %e, "correlator iteration failed");
                if shutdown.sleep(self.error_backoff) {
                    break;
                }
            }
        }

        info!("result correlator stopped");
        Ok(())
    }
}

impl<B: QueueBroker + 'static> ResultCorrelator<B> {
    pub fn spawn(self, policy: RetryPolicy, shutdown: ShutdownSignal) -> CorrelatorHandle {
        let stats = self.stats();
        let supervised = Supervisor::spawn("result-correlator", policy, shutdown, move |signal| {
            self.run(signal)
        });
        CorrelatorHandle { supervised, stats }
    }
}

#[derive(Debug)]
pub struct CorrelatorHandle {
    supervised: SupervisedHandle,
    stats: Arc<CorrelatorStats>,
}

impl CorrelatorHandle {
    pub fn stats(&self) -> CorrelatorStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn restarts(&self) -> u64 {
        self.supervised.restarts()
    }

    pub fn is_finished(&self) -> bool {
        self.supervised.is_finished()
    }

    pub fn shutdown(self) {
        self.supervised.shutdown();
    }
}

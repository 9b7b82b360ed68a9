//! Pull → analyse → publish loop for one analysis kind.
//!
//! ## Per-entry flow
//!
//! ```text
//! pop(job topic)
//!   ├─ nothing within poll interval → Idle (pop again)
//!   ├─ not an AnalysisJob           → dead-letter topic, continue
//!   ├─ deadline passed              → skip, nothing published
//!   └─ job
//!        ├─ kind ≠ engine kind      → error result (kind_mismatch)
//!        ├─ engine Ok(output)       → success result
//!        ├─ engine Err(e)           → error result (analysis_failed)
//!        └─ engine panics           → error result (panicked)
//!   push(result topic)
//! ```
//!
//! Every job that reaches the engine produces exactly one result carrying
//! the job's own id. The loop is strictly sequential.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use sentinel_core::{AnalysisJob, AnalysisResult, DEAD_LETTER_TOPIC, ErrorKind, JobId, RESULT_TOPIC};
use sentinel_engines::AnalysisEngine;
use sentinel_queue::{BrokerError, QueueBroker};

use crate::supervisor::{RetryPolicy, ShutdownSignal, SupervisedHandle, Supervisor, panic_message};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("failed to encode result for job {job_id}: {message}")]
    Encode { job_id: JobId, message: String },
}

/// What one loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Idle,
    Published { job_id: JobId, failed: bool },
    DeadLettered,
    Expired { job_id: JobId },
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
    expired: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Results published, successful or not.
    pub processed: u64,
    /// Results published with an error descriptor.
    pub failed: u64,
    pub dead_lettered: u64,
    pub expired: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// Entry written to the dead-letter topic.
#[derive(Debug, Serialize)]
struct DeadLetter<'a> {
    topic: &'a str,
    worker_name: &'a str,
    reason: String,
    entry: String,
    dead_lettered_at: chrono::DateTime<Utc>,
}

pub struct WorkerRuntime<B, E> {
    broker: B,
    engine: E,
    poll_interval: Duration,
    error_backoff: Duration,
    stats: Arc<WorkerStats>,
}

impl<B, E> core::fmt::Debug for WorkerRuntime<B, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("poll_interval", &self.poll_interval)
            .field("error_backoff", &self.error_backoff)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<B, E> WorkerRuntime<B, E>
where
    B: QueueBroker,
    E: AnalysisEngine,
{
    pub fn new(broker: B, engine: E) -> Self {
        Self {
            broker,
            engine,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_millis(500),
            stats: Arc::new(WorkerStats::default()),
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

    pub fn with_timing(self, timing: super::WorkerTiming) -> Self {
        self.with_poll_interval(timing.poll_interval)
            .with_error_backoff(timing.error_backoff)
    }

    pub fn topic(&self) -> &'static str {
        self.engine.kind().job_topic()
    }

    pub fn worker_name(&self) -> &'static str {
        self.engine.worker_name()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Wait up to the poll interval for one job and handle it.
    pub fn run_once(&self) -> Result<JobOutcome, WorkerError> {
        match self.broker.pop(self.topic(), self.poll_interval)? {
            Some(entry) => self.process_entry(entry),
            None => Ok(JobOutcome::Idle),
        }
    }

    /// Handle one raw entry popped from the job topic.
    #[instrument(skip_all, fields(worker = self.worker_name()))]
    pub fn process_entry(&self, entry: String) -> Result<JobOutcome, WorkerError> {
        let job: AnalysisJob = match serde_json::from_str(&entry) {
            Ok(job) => job,
            Err(e) => {
                self.dead_letter(entry, e.to_string());
                return Ok(JobOutcome::DeadLettered);
            }
        };

        if job.is_expired_at(Utc::now()) {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            warn!(job_id = %job.job_id, "job deadline passed before processing; skipped");
            return Ok(JobOutcome::Expired { job_id: job.job_id });
        }

        let result = self.execute(&job);
        let failed = result.is_failure();
        let text = serde_json::to_string(&result).map_err(|e| WorkerError::Encode {
            job_id: job.job_id,
            message: e.to_string(),
        })?;
        self.broker.push(RESULT_TOPIC, text)?;

        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        info!(job_id = %job.job_id, failed, "result published");

        Ok(JobOutcome::Published {
            job_id: job.job_id,
            failed,
        })
    }

    /// Run the engine, converting every failure mode into an error result.
    pub fn execute(&self, job: &AnalysisJob) -> AnalysisResult {
        let worker = self.worker_name();

        if job.kind != self.engine.kind() {
            warn!(job_id = %job.job_id, job_kind = %job.kind, "job routed to the wrong worker");
            return AnalysisResult::failure(
                job.job_id,
                worker,
                ErrorKind::KindMismatch,
                format!("{worker} cannot process '{}' jobs", job.kind),
            );
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.engine.analyze(job))) {
            Ok(Ok(output)) => match serde_json::to_value(output) {
                Ok(payload) => AnalysisResult::success(job.job_id, worker, payload),
                Err(e) => AnalysisResult::failure(job.job_id, worker, ErrorKind::Encode, e.to_string()),
            },
            Ok(Err(e)) => {
                warn!(job_id = %job.job_id, error = %e, "analysis failed");
                AnalysisResult::failure(job.job_id, worker, ErrorKind::AnalysisFailed, e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(job_id = %job.job_id, error = %message, "analysis panicked");
                AnalysisResult::failure(job.job_id, worker, ErrorKind::Panicked, message)
            }
        }
    }

    fn dead_letter(&self, entry: String, reason: String) {
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        error!(topic = self.topic(), error = %reason, "malformed job entry; moving to dead-letter topic");

        let letter = DeadLetter {
            topic: self.topic(),
            worker_name: self.worker_name(),
            reason,
            entry,
            dead_lettered_at: Utc::now(),
        };
        let pushed = serde_json::to_string(&letter)
            .map_err(|e| e.to_string())
            .and_then(|text| self.broker.push(DEAD_LETTER_TOPIC, text).map_err(|e| e.to_string()));
        if let Err(e) = pushed {
            warn!(error = %e, "dead-letter publish failed; entry discarded");
        }
    }

    /// Loop until `shutdown` fires. Iteration failures are logged and
    /// followed by a short backoff; they never end the loop.
    pub fn run(&self, shutdown: &ShutdownSignal) -> Result<(), WorkerError> {
        info!(worker = self.worker_name(), topic = self.topic(), "worker loop started");

        while !shutdown.is_triggered() {
            match self.run_once() {
                Ok(JobOutcome::Idle) => debug!(topic = self.topic(), "no job within poll interval"),
                Ok(_) => {}
                Err(e) => {
                    error!(worker = self.worker_name(), error = %e, "worker iteration failed");
                    if shutdown.sleep(self.error_backoff) {
                        break;
                    }
                }
            }
        }

        info!(worker = self.worker_name(), "worker loop stopped");
        Ok(())
    }
}

impl<B, E> WorkerRuntime<B, E>
where
    B: QueueBroker + 'static,
    E: AnalysisEngine,
{
    /// Run the loop on a supervised thread named after the worker.
    pub fn spawn(self, policy: RetryPolicy, shutdown: ShutdownSignal) -> WorkerHandle {
        let stats = self.stats();
        let supervised = Supervisor::spawn(self.worker_name(), policy, shutdown, move |signal| {
            self.run(signal)
        });
        WorkerHandle { supervised, stats }
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    supervised: SupervisedHandle,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        self.supervised.name()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn restarts(&self) -> u64 {
        self.supervised.restarts()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub fn shutdown(self) {
        self.supervised.shutdown();
    }

    /// Block until the loop exits on its own.
    pub fn join(self) {
        self.supervised.join();
    }
}

#[cfg(test)]
mod tests {
    use sentinel_core::{AnalysisKind, AnalysisOutput};
    use sentinel_engines::{EngineError, Finding, SecurityEngine};
    use sentinel_queue::InMemoryBroker;

    use super::*;

    #[derive(Debug)]
    struct PanickingEngine;

    impl AnalysisEngine for PanickingEngine {
        type Output = Vec<Finding>;

        fn kind(&self) -> AnalysisKind {
            AnalysisKind::StakingPrecompile
        }

        fn analyze(&self, _job: &AnalysisJob) -> Result<Self::Output, EngineError> {
            panic!("engine exploded")
        }
    }

    #[derive(Debug)]
    struct RefusingEngine;

    impl AnalysisEngine for RefusingEngine {
        type Output = ();

        fn kind(&self) -> AnalysisKind {
            AnalysisKind::Security
        }

        fn analyze(&self, _job: &AnalysisJob) -> Result<Self::Output, EngineError> {
            Err(EngineError::AnalysisFailed("compiler unavailable".into()))
        }
    }

    fn runtime<E: AnalysisEngine>(engine: E) -> (WorkerRuntime<Arc<InMemoryBroker>, E>, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::new());
        let rt = WorkerRuntime::new(broker.clone(), engine).with_poll_interval(Duration::from_millis(20));
        (rt, broker)
    }

    fn enqueue(broker: &InMemoryBroker, job: &AnalysisJob) {
        broker
            .push(job.topic(), serde_json::to_string(job).unwrap())
            .unwrap();
    }

    fn published(broker: &InMemoryBroker) -> Vec<AnalysisResult> {
        broker
            .peek_all(RESULT_TOPIC)
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    #[test]
    fn publishes_success_result_with_job_id() {
        let (rt, broker) = runtime(SecurityEngine);
        let job = AnalysisJob::new(
            AnalysisKind::Security,
            "contract W {\n  function f() public { require(tx.origin == owner); }\n}",
        );
        enqueue(&broker, &job);

        let outcome = rt.run_once().unwrap();
        assert_eq!(outcome, JobOutcome::Published { job_id: job.job_id, failed: false });

        let results = published(&broker);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job_id, job.job_id);
        assert_eq!(results[0].worker_name, "SecurityWorker");
        assert!(matches!(results[0].output, AnalysisOutput::Success(_)));
    }

    #[test]
    fn panic_becomes_error_result_with_original_job_id() {
        let (rt, broker) = runtime(PanickingEngine);
        let job = AnalysisJob::new(AnalysisKind::StakingPrecompile, "contract S {}");
        enqueue(&broker, &job);

        let outcome = rt.run_once().unwrap();
        assert_eq!(outcome, JobOutcome::Published { job_id: job.job_id, failed: true });

        let results = published(&broker);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].job_id, job.job_id);
        match &results[0].output {
            AnalysisOutput::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::Panicked);
                assert!(error.message.contains("engine exploded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // Loop survives: the next job is handled too.
        let next = AnalysisJob::new(AnalysisKind::StakingPrecompile, "contract T {}");
        enqueue(&broker, &next);
        rt.run_once().unwrap();
        assert_eq!(published(&broker).len(), 2);
        assert_eq!(rt.stats().snapshot().failed, 2);
    }

    #[test]
    fn engine_error_becomes_analysis_failed() {
        let (rt, broker) = runtime(RefusingEngine);
        let job = AnalysisJob::new(AnalysisKind::Security, "contract S {}");
        enqueue(&broker, &job);
        rt.run_once().unwrap();

        let result = &published(&broker)[0];
        match &result.output {
            AnalysisOutput::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::AnalysisFailed);
                assert!(error.message.contains("compiler unavailable"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn malformed_entry_is_dead_lettered_and_loop_continues() {
        let (rt, broker) = runtime(SecurityEngine);
        broker.push("core_security_jobs", "{not json".into()).unwrap();
        let job = AnalysisJob::new(AnalysisKind::Security, "contract S {}");
        enqueue(&broker, &job);

        assert_eq!(rt.run_once().unwrap(), JobOutcome::DeadLettered);
        assert!(matches!(rt.run_once().unwrap(), JobOutcome::Published { .. }));

        let letters = broker.peek_all(DEAD_LETTER_TOPIC);
        assert_eq!(letters.len(), 1);
        let letter: serde_json::Value = serde_json::from_str(&letters[0]).unwrap();
        assert_eq!(letter["entry"], "{not json");
        assert_eq!(letter["topic"], "core_security_jobs");
        assert_eq!(rt.stats().snapshot().dead_lettered, 1);
        assert_eq!(published(&broker).len(), 1);
    }

    #[test]
    fn wrong_kind_is_reported_not_analysed() {
        let (rt, broker) = runtime(SecurityEngine);
        let job = AnalysisJob::new(AnalysisKind::SubnetPortability, "contract S {}");
        // Misrouted: pushed to the security topic by hand.
        broker
            .push("core_security_jobs", serde_json::to_string(&job).unwrap())
            .unwrap();

        rt.run_once().unwrap();
        let result = &published(&broker)[0];
        assert_eq!(result.job_id, job.job_id);
        match &result.output {
            AnalysisOutput::Failure { error } => assert_eq!(error.kind, ErrorKind::KindMismatch),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn expired_job_is_skipped() {
        let (rt, broker) = runtime(SecurityEngine);
        let mut job = AnalysisJob::new(AnalysisKind::Security, "contract S {}");
        job.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        enqueue(&broker, &job);

        assert_eq!(rt.run_once().unwrap(), JobOutcome::Expired { job_id: job.job_id });
        assert!(published(&broker).is_empty());
        assert_eq!(rt.stats().snapshot().expired, 1);
    }

    #[test]
    fn idle_when_topic_empty() {
        let (rt, _broker) = runtime(SecurityEngine);
        assert_eq!(rt.run_once().unwrap(), JobOutcome::Idle);
    }

    #[test]
    fn spawned_worker_processes_and_shuts_down() {
        let (rt, broker) = runtime(SecurityEngine);
        let handle = rt.spawn(RetryPolicy::default(), ShutdownSignal::new());
        assert_eq!(handle.name(), "SecurityWorker");

        let job = AnalysisJob::new(AnalysisKind::Security, "contract S {}");
        enqueue(&broker, &job);

        let popped = broker.pop(RESULT_TOPIC, Duration::from_secs(5)).unwrap();
        let result: AnalysisResult = serde_json::from_str(&popped.unwrap()).unwrap();
        assert_eq!(result.job_id, job.job_id);

        // The counter is bumped right after the push.
        for _ in 0..100 {
            if handle.stats().processed == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.stats().processed, 1);

        handle.shutdown();
    }
}

//! Request dispatch: validation, job creation, registration, enqueue.
//!
//! ## Dispatch Flow
//!
//! ```text
//! AnalysisRequest
//!   ↓
//! 1. Validate (kind first, then payload) → SubmitError, nothing else happens
//!   ↓
//! 2. Build AnalysisJob (fresh random job id, optional deadline)
//!   ↓
//! 3. Insert job id → connection into the correlation registry (unacknowledged)
//!   ↓
//! 4. Push the job onto the kind's topic (rollback step 3 on failure)
//!   ↓
//! 5. Acknowledge the registration: queue the ack, then any parked result
//! ```
//!
//! Registration happens-before the push, so a worker can never publish a
//! result the correlator is unable to route. A result that beats step 5 is
//! parked on the registration and flushed right after the ack. No lock is
//! held across the push.
//!
//! The dispatcher performs blocking broker IO; async callers should run it on
//! a blocking thread.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use sentinel_core::{AnalysisJob, AnalysisRequest, DispatchAck, SubmitError};
use sentinel_queue::QueueBroker;

use crate::connection::ConnectionHandle;
use crate::registry::CorrelationRegistry;

pub struct Dispatcher<B> {
    broker: B,
    registry: Arc<CorrelationRegistry>,
    job_ttl: Option<Duration>,
}

impl<B> core::fmt::Debug for Dispatcher<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("job_ttl", &self.job_ttl)
            .finish_non_exhaustive()
    }
}

impl<B: QueueBroker> Dispatcher<B> {
    pub fn new(broker: B, registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            broker,
            registry,
            job_ttl: None,
        }
    }

    /// Attach a deadline to every dispatched job.
    pub fn with_job_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Parse a raw client frame and submit it.
    pub fn submit_text(
        &self,
        text: &str,
        conn: &ConnectionHandle,
    ) -> Result<DispatchAck, SubmitError> {
        self.submit(AnalysisRequest::from_json(text)?, conn)
    }

    /// Validate, register and enqueue one request on behalf of `conn`.
    ///
    /// On success the acknowledgement has already been queued on `conn` (and
    /// is also returned). On error nothing was queued, registered or pushed;
    /// replying with the error is up to the caller.
    #[instrument(skip_all, fields(connection_id = %conn.id()))]
    pub fn submit(
        &self,
        request: AnalysisRequest,
        conn: &ConnectionHandle,
    ) -> Result<DispatchAck, SubmitError> {
        let request = request.validate()?;

        let mut job = AnalysisJob::new(request.kind, request.source_payload)
            .with_context(request.context);
        if let Some(ttl) = self.job_ttl {
            job = job.with_ttl(ttl);
        }

        let entry = serde_json::to_string(&job).map_err(|e| SubmitError::Encode(e.to_string()))?;
        let ack = DispatchAck::new(job.job_id);
        let ack_text = serde_json::to_string(&ack).map_err(|e| SubmitError::Encode(e.to_string()))?;

        let registration = self.registry.insert(job.job_id, conn.clone(), job.expires_at);

        if let Err(e) = self.broker.push(job.topic(), entry) {
            self.registry.remove(&job.job_id);
            registration.abandon();
            warn!(job_id = %job.job_id, topic = job.topic(), error = %e, "job push failed; registration rolled back");
            return Err(SubmitError::dispatch(e.to_string()));
        }

        if registration.acknowledge(ack_text).is_err() {
            // The job stays in flight; its result will be dropped downstream.
            debug!(job_id = %job.job_id, "client closed before acknowledgement");
        }

        info!(job_id = %job.job_id, kind = %job.kind, topic = job.topic(), "job dispatched");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    use sentinel_core::{AnalysisKind, AnalysisResult, DEAD_LETTER_TOPIC, JobId, RESULT_TOPIC};
    use sentinel_queue::{BrokerError, InMemoryBroker};

    use super::*;
    use crate::correlator::{CorrelationOutcome, ResultCorrelator};

    fn setup() -> (Dispatcher<Arc<InMemoryBroker>>, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = Dispatcher::new(broker.clone(), Arc::new(CorrelationRegistry::new()));
        (dispatcher, broker)
    }

    /// Broker whose pushes always fail.
    #[derive(Debug, Default)]
    struct FailingBroker {
        attempts: AtomicUsize,
    }

    impl QueueBroker for FailingBroker {
        fn push(&self, _topic: &str, _entry: String) -> Result<(), BrokerError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::Connection("connection refused".into()))
        }

        fn pop(&self, _topic: &str, _timeout: Duration) -> Result<Option<String>, BrokerError> {
            Ok(None)
        }

        fn len(&self, _topic: &str) -> Result<usize, BrokerError> {
            Ok(0)
        }
    }

    /// Broker that records the job id of every push, then stalls.
    #[derive(Debug)]
    struct SlowBroker {
        inner: InMemoryBroker,
        delay: Duration,
        pushed: Mutex<Vec<JobId>>,
    }

    impl QueueBroker for SlowBroker {
        fn push(&self, topic: &str, entry: String) -> Result<(), BrokerError> {
            if let Ok(job) = serde_json::from_str::<AnalysisJob>(&entry) {
                self.pushed.lock().unwrap().push(job.job_id);
            }
            thread::sleep(self.delay);
            self.inner.push(topic, entry)
        }

        fn pop(&self, topic: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
            self.inner.pop(topic, timeout)
        }

        fn len(&self, topic: &str) -> Result<usize, BrokerError> {
            self.inner.len(topic)
        }
    }

    #[test]
    fn valid_request_lands_on_exactly_one_topic() {
        for kind in AnalysisKind::ALL {
            let (dispatcher, broker) = setup();
            let (conn, _rx) = ConnectionHandle::channel();

            let ack = dispatcher
                .submit(AnalysisRequest::new(kind.as_str(), "contract X{}"), &conn)
                .unwrap();

            assert_eq!(broker.total_pushes(), 1);
            assert_eq!(broker.push_count(kind.job_topic()), 1);

            let queued = broker.peek_all(kind.job_topic());
            let job: AnalysisJob = serde_json::from_str(&queued[0]).unwrap();
            assert_eq!(job.job_id, ack.job_id);
            assert_eq!(job.kind, kind);

            for other in AnalysisKind::ALL.iter().filter(|k| **k != kind) {
                assert!(broker.peek_all(other.job_topic()).is_empty());
            }
            assert!(broker.peek_all(RESULT_TOPIC).is_empty());
            assert!(broker.peek_all(DEAD_LETTER_TOPIC).is_empty());
        }
    }

    #[test]
    fn ack_is_queued_and_registration_exists() {
        let (dispatcher, _broker) = setup();
        let (conn, mut rx) = ConnectionHandle::channel();

        let ack = dispatcher
            .submit_text(r#"{"source_payload": "contract X{}", "analysis_kind": "security"}"#, &conn)
            .unwrap();

        let sent: DispatchAck = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(sent, ack);
        assert_eq!(sent.status, "dispatched");
        assert!(dispatcher.registry().contains(&ack.job_id));
    }

    #[test]
    fn unknown_kind_touches_nothing() {
        let (dispatcher, broker) = setup();
        let (conn, mut rx) = ConnectionHandle::channel();

        let err = dispatcher
            .submit_text(r#"{"analysis_kind": "nonexistent"}"#, &conn)
            .unwrap_err();

        assert!(matches!(err, SubmitError::UnsupportedKind(_)));
        assert_eq!(broker.total_pushes(), 0);
        assert!(dispatcher.registry().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_payload_touches_nothing() {
        let (dispatcher, broker) = setup();
        let (conn, _rx) = ConnectionHandle::channel();

        let err = dispatcher
            .submit(AnalysisRequest::new("security", ""), &conn)
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(broker.total_pushes(), 0);
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn failed_push_rolls_back_registration() {
        let broker = Arc::new(FailingBroker::default());
        let dispatcher = Dispatcher::new(broker.clone(), Arc::new(CorrelationRegistry::new()));
        let (conn, mut rx) = ConnectionHandle::channel();

        let err = dispatcher
            .submit(AnalysisRequest::new("security", "contract X{}"), &conn)
            .unwrap_err();

        assert!(matches!(err, SubmitError::Dispatch(_)));
        assert_eq!(broker.attempts.load(Ordering::SeqCst), 1);
        assert!(dispatcher.registry().is_empty());
        assert!(rx.try_recv().is_err(), "no ack may be sent for a failed dispatch");
    }

    #[test]
    fn context_passes_through_and_ttl_sets_deadline() {
        let (dispatcher, broker) = setup();
        let dispatcher = dispatcher.with_job_ttl(Some(Duration::from_secs(30)));
        let (conn, _rx) = ConnectionHandle::channel();

        let mut request = AnalysisRequest::new("consensus_compliance", "contract X{}");
        request.context = Some(serde_json::json!({"chain": "fuji", "tags": ["a"]}));
        dispatcher.submit(request, &conn).unwrap();

        let raw = broker.peek_all(AnalysisKind::ConsensusCompliance.job_topic());
        let job: AnalysisJob = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(job.context, Some(serde_json::json!({"chain": "fuji", "tags": ["a"]})));
        assert!(job.expires_at.is_some());
    }

    #[test]
    fn closed_connection_still_dispatches() {
        let (dispatcher, broker) = setup();
        let (conn, rx) = ConnectionHandle::channel();
        drop(rx);

        let ack = dispatcher
            .submit(AnalysisRequest::new("security", "contract X{}"), &conn)
            .unwrap();
        assert_eq!(broker.total_pushes(), 1);
        assert!(dispatcher.registry().contains(&ack.job_id));
    }

    #[test]
    fn slow_push_does_not_block_routing_and_ack_still_comes_first() {
        let broker = Arc::new(SlowBroker {
            inner: InMemoryBroker::new(),
            delay: Duration::from_millis(400),
            pushed: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(CorrelationRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(broker.clone(), registry.clone()));
        let correlator = ResultCorrelator::new(broker.clone(), registry.clone());

        // Client B is already waiting on a job of its own.
        let (b, mut b_rx) = ConnectionHandle::channel();
        let job_b = JobId::new();
        registry.insert(job_b, b, None).acknowledge("ack-b".into()).unwrap();
        assert_eq!(b_rx.try_recv().unwrap(), "ack-b");

        let (a, mut a_rx) = ConnectionHandle::channel();
        let submitting = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.submit(AnalysisRequest::new("security", "contract A{}"), &a))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        let job_a = loop {
            if let Some(id) = broker.pushed.lock().unwrap().first().copied() {
                break id;
            }
            assert!(Instant::now() < deadline, "push never started");
            thread::sleep(Duration::from_millis(2));
        };

        // A's push is still stalled; routing for B and for A must not wait on it.
        let started = Instant::now();
        let raw_b = serde_json::to_string(&AnalysisResult::success(job_b, "SecurityWorker", serde_json::json!(["b"]))).unwrap();
        assert_eq!(correlator.route(raw_b.clone()).unwrap(), CorrelationOutcome::Delivered(job_b));
        let raw_a = serde_json::to_string(&AnalysisResult::success(job_a, "SecurityWorker", serde_json::json!(["a"]))).unwrap();
        assert_eq!(correlator.route(raw_a.clone()).unwrap(), CorrelationOutcome::Delivered(job_a));
        assert!(started.elapsed() < Duration::from_millis(200));

        assert_eq!(b_rx.try_recv().unwrap(), raw_b);
        assert!(a_rx.try_recv().is_err(), "result must not overtake the ack");

        let ack = submitting.join().unwrap().unwrap();
        assert_eq!(ack.job_id, job_a);
        let first: DispatchAck = serde_json::from_str(&a_rx.try_recv().unwrap()).unwrap();
        assert_eq!(first, ack);
        assert_eq!(a_rx.try_recv().unwrap(), raw_a);
        assert!(a_rx.try_recv().is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn oversized_ttl_dispatches_without_deadline() {
        let (dispatcher, broker) = setup();
        let dispatcher = dispatcher.with_job_ttl(Some(Duration::from_secs(u64::MAX)));
        let (conn, mut rx) = ConnectionHandle::channel();

        let ack = dispatcher
            .submit(AnalysisRequest::new("security", "contract X{}"), &conn)
            .unwrap();

        let raw = broker.peek_all(AnalysisKind::Security.job_topic());
        let job: AnalysisJob = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(job.job_id, ack.job_id);
        assert!(job.expires_at.is_none());
        assert!(rx.try_recv().is_ok());
    }
}

//! Service wiring for the dispatcher process.
//!
//! With a broker URL configured, jobs go through Redis and workers run as
//! separate `sentinel-worker` processes. Without one, everything runs in this
//! process: an in-memory broker plus one supervised worker per kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use sentinel_core::{AnalysisKind, DEAD_LETTER_TOPIC, RESULT_TOPIC};

use sentinel_infra::broker::{InMemoryBroker, QueueBroker, RedisListBroker};
use sentinel_infra::correlator::{CorrelatorHandle, CorrelatorStatsSnapshot, ResultCorrelator};
use sentinel_infra::worker::{WorkerHandle, WorkerStatsSnapshot};
use sentinel_infra::{
    CorrelationRegistry, Dispatcher, RetryPolicy, SentinelConfig, ShutdownSignal, WorkerTiming,
    spawn_all_workers,
};

pub type SharedBroker = Arc<dyn QueueBroker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    InMemory,
    Redis,
}

impl BrokerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerMode::InMemory => "in_memory",
            BrokerMode::Redis => "redis",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkerHealth {
    pub name: String,
    pub restarts: u64,
    #[serde(flatten)]
    pub stats: WorkerStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub broker: BrokerMode,
    /// Jobs dispatched whose result has not been routed yet.
    pub pending_jobs: usize,
    /// Entries waiting on each topic; topics the broker could not report are left out.
    pub queue_depths: BTreeMap<&'static str, usize>,
    pub correlator: CorrelatorStatsSnapshot,
    pub correlator_restarts: u64,
    pub workers: Vec<WorkerHealth>,
}

#[derive(Debug)]
pub struct AppServices {
    pub dispatcher: Dispatcher<SharedBroker>,
    mode: BrokerMode,
    correlator: CorrelatorHandle,
    workers: Vec<WorkerHandle>,
    shutdown: ShutdownSignal,
}

impl AppServices {
    /// Select the broker from `config` and start the background loops.
    pub fn start(config: &SentinelConfig) -> anyhow::Result<Self> {
        match &config.redis_url {
            Some(url) => {
                let broker = RedisListBroker::new(url).context("invalid redis url")?;
                broker.ping().context("redis is unreachable")?;
                info!("using redis list broker");
                Ok(Self::with_broker(Arc::new(broker), BrokerMode::Redis, config))
            }
            None => {
                info!("no broker url configured; using in-memory broker with in-process workers");
                Ok(Self::in_memory(config))
            }
        }
    }

    /// Single-process mode: in-memory broker and one worker per kind.
    pub fn in_memory(config: &SentinelConfig) -> Self {
        Self::with_broker(Arc::new(InMemoryBroker::new()), BrokerMode::InMemory, config)
    }

    fn with_broker(broker: SharedBroker, mode: BrokerMode, config: &SentinelConfig) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let shutdown = ShutdownSignal::new();

        let correlator = ResultCorrelator::new(broker.clone(), registry.clone())
            .with_poll_interval(config.poll_interval)
            .with_error_backoff(config.error_backoff)
            .spawn(RetryPolicy::default(), shutdown.clone());

        let workers = match mode {
            BrokerMode::InMemory => spawn_all_workers(broker.clone(), config.worker_timing(), &shutdown),
            BrokerMode::Redis => Vec::new(),
        };

        let dispatcher = Dispatcher::new(broker, registry).with_job_ttl(config.job_ttl);

        Self {
            dispatcher,
            mode,
            correlator,
            workers,
            shutdown,
        }
    }

    pub fn broker_mode(&self) -> BrokerMode {
        self.mode
    }

    /// Snapshot for `GET /health`. Queries the broker, so it may block.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            broker: self.mode,
            pending_jobs: self.dispatcher.registry().len(),
            queue_depths: self.queue_depths(),
            correlator: self.correlator.stats(),
            correlator_restarts: self.correlator.restarts(),
            workers: self
                .workers
                .iter()
                .map(|w| WorkerHealth {
                    name: w.name().to_string(),
                    restarts: w.restarts(),
                    stats: w.stats(),
                })
                .collect(),
        }
    }

    fn queue_depths(&self) -> BTreeMap<&'static str, usize> {
        let broker = self.dispatcher.broker();
        AnalysisKind::ALL
            .iter()
            .map(|k| k.job_topic())
            .chain([RESULT_TOPIC, DEAD_LETTER_TOPIC])
            .filter_map(|topic| match broker.len(topic) {
                Ok(depth) => Some((topic, depth)),
                Err(e) => {
                    warn!(topic, error = %e, "queue depth unavailable");
                    None
                }
            })
            .collect()
    }

    /// Ask every background loop to stop; they exit within one poll interval.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

//! Worker runtime: the generic consumption loop shared by every analysis kind.

pub mod runtime;

use std::time::Duration;

use sentinel_core::AnalysisKind;
use sentinel_engines::{
    ConsensusComplianceEngine, SecurityEngine, StakingPrecompileEngine, SubnetPortabilityEngine,
};
use sentinel_queue::QueueBroker;

use crate::supervisor::{RetryPolicy, ShutdownSignal};

pub use runtime::{JobOutcome, WorkerError, WorkerHandle, WorkerRuntime, WorkerStats, WorkerStatsSnapshot};

/// Loop timing shared by every worker in a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

/// Start a supervised worker for `kind` backed by its bundled engine.
pub fn spawn_worker<B>(
    kind: AnalysisKind,
    broker: B,
    timing: WorkerTiming,
    shutdown: ShutdownSignal,
) -> WorkerHandle
where
    B: QueueBroker + 'static,
{
    let policy = RetryPolicy::default();
    match kind {
        AnalysisKind::Security => WorkerRuntime::new(broker, SecurityEngine)
            .with_timing(timing)
            .spawn(policy, shutdown),
        AnalysisKind::StakingPrecompile => WorkerRuntime::new(broker, StakingPrecompileEngine)
            .with_timing(timing)
            .spawn(policy, shutdown),
        AnalysisKind::SubnetPortability => WorkerRuntime::new(broker, SubnetPortabilityEngine)
            .with_timing(timing)
            .spawn(policy, shutdown),
        AnalysisKind::ConsensusCompliance => WorkerRuntime::new(broker, ConsensusComplianceEngine)
            .with_timing(timing)
            .spawn(policy, shutdown),
    }
}

/// One worker per kind on a shared broker (single-process mode).
pub fn spawn_all_workers<B>(broker: B, timing: WorkerTiming, shutdown: &ShutdownSignal) -> Vec<WorkerHandle>
where
    B: QueueBroker + Clone + 'static,
{
    AnalysisKind::ALL
        .into_iter()
        .map(|kind| spawn_worker(kind, broker.clone(), timing, shutdown.clone()))
        .collect()
}

//! Standalone worker process: serves exactly one analysis kind from Redis.
//!
//! ```text
//! sentinel-worker security
//! SENTINEL_WORKER_KIND=staking_precompile sentinel-worker
//! ```

use anyhow::Context;

use sentinel_core::AnalysisKind;
use sentinel_infra::broker::RedisListBroker;
use sentinel_infra::{SentinelConfig, ShutdownSignal, spawn_worker};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = SentinelConfig::from_env().context("invalid configuration")?;
    let kind = resolve_kind(&config, std::env::args().nth(1).as_deref())?;
    sentinel_observability::init(kind.worker_name());

    let url = config.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
    let broker = RedisListBroker::new(url).context("invalid redis url")?;
    broker.ping().context("redis is unreachable")?;

    tracing::info!(kind = %kind, topic = kind.job_topic(), "starting worker");

    // Runs until the process is killed; the supervisor restarts a crashed loop.
    spawn_worker(kind, broker, config.worker_timing(), ShutdownSignal::new()).join();
    Ok(())
}

/// The CLI argument wins over `SENTINEL_WORKER_KIND`.
fn resolve_kind(config: &SentinelConfig, arg: Option<&str>) -> anyhow::Result<AnalysisKind> {
    match arg {
        Some(arg) => arg.parse().map_err(anyhow::Error::from),
        None => config.require_worker_kind().map_err(anyhow::Error::from),
    }
}

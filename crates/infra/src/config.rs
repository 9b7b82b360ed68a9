//! Runtime configuration from environment variables.
//!
//! Binaries load `.env` with `dotenvy` first; this module only reads the
//! process environment (or an injected lookup in tests).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use sentinel_core::AnalysisKind;

use crate::worker::WorkerTiming;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_JOB_TTL_SECS: u64 = 900;
/// Thirty days.
pub const MAX_JOB_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    /// Broker URL. `None` selects the in-memory broker with in-process workers.
    pub redis_url: Option<String>,
    pub bind_addr: SocketAddr,
    /// Job deadline; `None` disables expiry.
    pub job_ttl: Option<Duration>,
    /// Bounded wait per broker pop.
    pub poll_interval: Duration,
    /// Pause after a failed loop iteration.
    pub error_backoff: Duration,
    pub worker_kind: Option<AnalysisKind>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            job_ttl: Some(Duration::from_secs(DEFAULT_JOB_TTL_SECS)),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            error_backoff: Duration::from_millis(DEFAULT_ERROR_BACKOFF_MS),
            worker_kind: None,
        }
    }
}

impl SentinelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let redis_url = get("SENTINEL_REDIS_URL").or_else(|| get("REDIS_URL"));

        let bind_addr = match get("SENTINEL_BIND_ADDR") {
            Some(v) => parse("SENTINEL_BIND_ADDR", &v)?,
            None => SocketAddr::from_str(DEFAULT_BIND_ADDR)
                .map_err(|_| invalid("SENTINEL_BIND_ADDR", DEFAULT_BIND_ADDR))?,
        };

        let ttl_secs: u64 = get("SENTINEL_JOB_TTL_SECS")
            .map(|v| parse("SENTINEL_JOB_TTL_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_JOB_TTL_SECS);
        if ttl_secs > MAX_JOB_TTL_SECS {
            return Err(invalid("SENTINEL_JOB_TTL_SECS", &ttl_secs.to_string()));
        }
        let job_ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));

        let poll_ms: u64 = get("SENTINEL_POLL_INTERVAL_MS")
            .map(|v| parse("SENTINEL_POLL_INTERVAL_MS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_ms == 0 {
            return Err(invalid("SENTINEL_POLL_INTERVAL_MS", "0"));
        }

        let backoff_ms: u64 = get("SENTINEL_ERROR_BACKOFF_MS")
            .map(|v| parse("SENTINEL_ERROR_BACKOFF_MS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_ERROR_BACKOFF_MS);

        let worker_kind = get("SENTINEL_WORKER_KIND")
            .map(|v| {
                AnalysisKind::from_str(v.trim()).map_err(|_| invalid("SENTINEL_WORKER_KIND", &v))
            })
            .transpose()?;

        Ok(Self {
            redis_url,
            bind_addr,
            job_ttl,
            poll_interval: Duration::from_millis(poll_ms),
            error_backoff: Duration::from_millis(backoff_ms),
            worker_kind,
        })
    }

    pub fn worker_timing(&self) -> WorkerTiming {
        WorkerTiming {
            poll_interval: self.poll_interval,
            error_backoff: self.error_backoff,
        }
    }

    /// The worker kind, failing if neither env nor CLI supplied one.
    pub fn require_worker_kind(&self) -> Result<AnalysisKind, ConfigError> {
        self.worker_kind.ok_or(ConfigError::Missing("SENTINEL_WORKER_KIND"))
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

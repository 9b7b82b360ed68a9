//! Redis-list backed broker.
//!
//! Each topic is a Redis list keyed by the topic name:
//! - **push**: `RPUSH topic entry`
//! - **pop**: `BLPOP topic timeout` (atomic hand-off between competing consumers)
//! - **len**: `LLEN topic`
//!
//! A connection is opened per call. Blocking pops hold their connection for
//! the full wait, so sharing one connection between a blocked consumer and a
//! producer would stall the producer.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use sentinel_queue::{BrokerError, QueueBroker};

#[derive(Debug, Clone)]
pub struct RedisListBroker {
    client: Arc<redis::Client>,
}

impl RedisListBroker {
    /// Create a broker for `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// Only parses the URL; the first command surfaces connectivity errors.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Round-trip a `PING`; used at startup to fail fast on a bad URL.
    pub fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| BrokerError::Command(format!("PING failed: {e}")))?;
        Ok(())
    }

    fn connection(&self) -> Result<redis::Connection, BrokerError> {
        self.client
            .get_connection()
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }
}

/// BLPOP takes whole seconds (fractional seconds need Redis 6); zero would
/// mean "wait forever", so round up to at least one.
fn blpop_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

impl QueueBroker for RedisListBroker {
    #[instrument(skip(self, entry), fields(topic = topic), err)]
    fn push(&self, topic: &str, entry: String) -> Result<(), BrokerError> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(topic)
            .arg(entry)
            .query(&mut conn)
            .map_err(|e| BrokerError::Command(format!("RPUSH failed: {e}")))?;
        Ok(())
    }

    fn pop(&self, topic: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        let mut conn = self.connection()?;
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(topic)
            .arg(blpop_timeout_secs(timeout))
            .query(&mut conn)
            .map_err(|e| BrokerError::Command(format!("BLPOP failed: {e}")))?;
        Ok(popped.map(|(_key, entry)| entry))
    }

    fn len(&self, topic: &str) -> Result<usize, BrokerError> {
        let mut conn = self.connection()?;
        redis::cmd("LLEN")
            .arg(topic)
            .query(&mut conn)
            .map_err(|e| BrokerError::Command(format!("LLEN failed: {e}")))
    }
}

//! Broker adapters.
//!
//! The in-memory broker lives in `sentinel-queue`; the Redis list broker is
//! compiled in with the `redis` feature.

#[cfg(feature = "redis")]
pub mod redis_list;

#[cfg(feature = "redis")]
pub use redis_list::RedisListBroker;

pub use sentinel_queue::{BrokerError, InMemoryBroker, QueueBroker};

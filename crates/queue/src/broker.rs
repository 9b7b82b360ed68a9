//! Broker contract shared by the dispatcher, the correlator and every worker.
//!
//! ## Semantics
//!
//! - **FIFO per topic**: entries pop in push order within one topic. There is
//!   no ordering across topics.
//! - **Atomic hand-off**: a pushed entry is popped by at most one consumer.
//!   Callers add no locking of their own.
//! - **Unbounded**: push never blocks on a slow consumer. There is no
//!   back-pressure.
//! - **At-most-once**: an entry that was popped is gone, whether or not the
//!   consumer finished with it.
//!
//! ## Blocking pops
//!
//! Consumers wait indefinitely for work. To keep long-lived loops responsive
//! to shutdown, the wait is expressed as a bounded `pop` that returns
//! `Ok(None)` when nothing arrived in time; loops simply pop again.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed a command.
    #[error("broker command error: {0}")]
    Command(String),

    /// Internal state is unusable (e.g. the broker was closed).
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Topic-addressed FIFO broker.
///
/// Entries are opaque strings (serialized envelopes); encoding is agreed on
/// by producers and consumers, not by the broker.
pub trait QueueBroker: Send + Sync {
    /// Append `entry` to the tail of `topic`.
    fn push(&self, topic: &str, entry: String) -> Result<(), BrokerError>;

    /// Remove and return the head of `topic`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` if the wait elapsed with the topic still empty.
    fn pop(&self, topic: &str, timeout: Duration) -> Result<Option<String>, BrokerError>;

    /// Number of entries currently waiting on `topic`.
    fn len(&self, topic: &str) -> Result<usize, BrokerError>;
}

impl<B> QueueBroker for Arc<B>
where
    B: QueueBroker + ?Sized,
{
    fn push(&self, topic: &str, entry: String) -> Result<(), BrokerError> {
        (**self).push(topic, entry)
    }

    fn pop(&self, topic: &str, timeout: Duration) -> Result<Option<String>, BrokerError> {
        (**self).pop(topic, timeout)
    }

    fn len(&self, topic: &str) -> Result<usize, BrokerError> {
        (**self).len(topic)
    }
}

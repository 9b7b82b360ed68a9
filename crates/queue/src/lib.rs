//! `sentinel-queue` — the queue broker abstraction (mechanics only).
//!
//! A broker is a shared, FIFO list-per-topic store with two operations:
//! push to the tail and blocking pop from the head. Producers and consumers
//! never talk to each other directly; topics are the only coupling.
//!
//! This crate has no IO. Infrastructure-backed brokers (Redis lists) live in
//! `sentinel-infra`.

pub mod broker;
pub mod in_memory;

pub use broker::{BrokerError, QueueBroker};
pub use in_memory::InMemoryBroker;

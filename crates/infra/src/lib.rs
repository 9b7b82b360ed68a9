//! Infrastructure layer: brokers, dispatch, correlation, worker loops, config.
//!
//! Everything here is synchronous and thread-based; the API crate bridges
//! into it from async handlers with `spawn_blocking`.

pub mod broker;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod registry;
pub mod supervisor;
pub mod worker;


pub use config::{ConfigError, SentinelConfig};
pub use connection::{ConnectionClosed, ConnectionHandle};
pub use correlator::{CorrelationOutcome, CorrelatorError, CorrelatorHandle, ResultCorrelator};
pub use dispatcher::Dispatcher;
pub use registry::CorrelationRegistry;
pub use supervisor::{RetryPolicy, ShutdownSignal, Supervisor};
pub use worker::{WorkerHandle, WorkerRuntime, WorkerTiming, spawn_all_workers, spawn_worker};

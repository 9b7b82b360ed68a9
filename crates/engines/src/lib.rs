//! `sentinel-engines`
//!
//! **Responsibility:** pluggable analysis engines behind the fixed job/result
//! contract.
//!
//! Engines know nothing about brokers, topics or clients:
//! - They receive an [`AnalysisJob`](sentinel_core::AnalysisJob).
//! - They return their own typed output or an [`EngineError`].
//! - The worker runtime (in `sentinel-infra`) turns either into a result
//!   envelope keyed by the job id.

pub mod consensus;
pub mod engine;
pub mod finding;
pub mod portability;
mod scan;
pub mod security;
pub mod staking;

pub use consensus::ConsensusComplianceEngine;
pub use engine::{AnalysisEngine, EngineError};
pub use finding::Finding;
pub use portability::SubnetPortabilityEngine;
pub use security::SecurityEngine;
pub use staking::StakingPrecompileEngine;

//! The closed set of analysis kinds and their broker topics.
//!
//! Adding a kind means adding a variant here (which forces a topic and a
//! worker name through the exhaustive matches below) and deploying a worker
//! for it. There is no runtime registration.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

/// Shared topic every worker publishes results to.
pub const RESULT_TOPIC: &str = "sentinel_results";

/// Topic receiving job entries a worker could not parse.
pub const DEAD_LETTER_TOPIC: &str = "sentinel_dead_letters";

/// Supported analysis kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Security,
    StakingPrecompile,
    SubnetPortability,
    ConsensusCompliance,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Security,
        AnalysisKind::StakingPrecompile,
        AnalysisKind::SubnetPortability,
        AnalysisKind::ConsensusCompliance,
    ];

    /// Wire identifier used in client requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Security => "security",
            AnalysisKind::StakingPrecompile => "staking_precompile",
            AnalysisKind::SubnetPortability => "subnet_portability",
            AnalysisKind::ConsensusCompliance => "consensus_compliance",
        }
    }

    /// Job topic consumed by this kind's worker.
    pub fn job_topic(&self) -> &'static str {
        match self {
            AnalysisKind::Security => "core_security_jobs",
            AnalysisKind::StakingPrecompile => "staking_precompile_jobs",
            AnalysisKind::SubnetPortability => "subnet_portability_jobs",
            AnalysisKind::ConsensusCompliance => "consensus_compliance_jobs",
        }
    }

    /// Name stamped on every result this kind's worker publishes.
    pub fn worker_name(&self) -> &'static str {
        match self {
            AnalysisKind::Security => "SecurityWorker",
            AnalysisKind::StakingPrecompile => "StakingPrecompileWorker",
            AnalysisKind::SubnetPortability => "SubnetPortabilityWorker",
            AnalysisKind::ConsensusCompliance => "ConsensusComplianceWorker",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl core::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = SubmitError;

    /// Exact, case-sensitive match on the wire identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SubmitError::unsupported_kind(s))
    }
}

use serde::Serialize;
use thiserror::Error;

use sentinel_core::{AnalysisJob, AnalysisKind};

/// One analysis engine, statically tied to one [`AnalysisKind`].
///
/// Engines should report failures as [`EngineError`] rather than panic; the
/// worker runtime still catches panics, but an explicit error carries a
/// better message to the client.
pub trait AnalysisEngine: Send + Sync + 'static {
    /// Domain payload placed in `output` on success.
    type Output: Serialize;

    /// The kind this engine serves. A worker only accepts jobs of this kind.
    fn kind(&self) -> AnalysisKind;

    /// Name stamped on published results.
    fn worker_name(&self) -> &'static str {
        self.kind().worker_name()
    }

    /// Analyse one job. Must not touch the broker.
    fn analyze(&self, job: &AnalysisJob) -> Result<Self::Output, EngineError>;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
}

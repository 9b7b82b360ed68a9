//! Job envelope pushed onto a kind's topic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::JobId;
use crate::kind::AnalysisKind;

/// A unit of requested analysis work.
///
/// Immutable once built by the dispatcher. Consumed by at most one worker
/// runtime (possibly by none, if the job is lost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: JobId,
    pub kind: AnalysisKind,
    /// Source text to analyse.
    pub source_payload: String,
    /// Opaque caller context, passed through unexamined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    /// After this instant nobody is waiting for the result any more.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// Build a job with a fresh random id.
    pub fn new(kind: AnalysisKind, source_payload: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            kind,
            source_payload: source_payload.into(),
            context: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_context(mut self, context: Option<JsonValue>) -> Self {
        self.context = context;
        self
    }

    /// Set `expires_at` relative to `created_at`.
    ///
    /// A deadline past the representable range means no deadline.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| self.created_at.checked_add_signed(d));
        self
    }

    pub fn topic(&self) -> &'static str {
        self.kind.job_topic()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

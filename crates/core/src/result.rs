//! Result envelope published by every worker onto [`crate::RESULT_TOPIC`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::JobId;

/// What a worker produced for one job.
///
/// `job_id` must equal the originating job's id; it is the only thing the
/// correlator looks at. Everything else is forwarded to the client verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub worker_name: String,
    pub output: AnalysisOutput,
}

impl AnalysisResult {
    pub fn success(job_id: JobId, worker_name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            job_id,
            worker_name: worker_name.into(),
            output: AnalysisOutput::Success(payload),
        }
    }

    pub fn failure(
        job_id: JobId,
        worker_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            worker_name: worker_name.into(),
            output: AnalysisOutput::Failure {
                error: ErrorDescriptor {
                    kind,
                    message: message.into(),
                },
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.output, AnalysisOutput::Failure { .. })
    }
}

/// Either the engine's domain payload or an error descriptor.
///
/// Serialized untagged: a success is the engine payload as-is (typically an
/// array of findings), a failure is `{"error": {"kind": .., "message": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutput {
    Failure { error: ErrorDescriptor },
    Success(JsonValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The engine reported a failure.
    AnalysisFailed,
    /// The engine panicked; caught at the worker boundary.
    Panicked,
    /// The job was routed to a worker for a different kind.
    KindMismatch,
    /// The engine's output could not be encoded.
    Encode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_output_is_the_bare_payload() {
        let id = JobId::new();
        let result = AnalysisResult::success(id, "SecurityWorker", serde_json::json!([{"line": 1}]));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["job_id"], serde_json::json!(id.to_string()));
        assert_eq!(json["worker_name"], "SecurityWorker");
        assert_eq!(json["output"], serde_json::json!([{"line": 1}]));
    }

    #[test]
    fn failure_output_carries_error_descriptor() {
        let id = JobId::new();
        let result = AnalysisResult::failure(id, "SecurityWorker", ErrorKind::Panicked, "boom");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["output"]["error"]["kind"], "panicked");
        assert_eq!(json["output"]["error"]["message"], "boom");

        let back: AnalysisResult = serde_json::from_value(json).unwrap();
        assert!(back.is_failure());
        assert_eq!(back.job_id, id);
    }

    #[test]
    fn rejects_result_without_job_id() {
        let raw = serde_json::json!({"worker_name": "x", "output": []});
        assert!(serde_json::from_value::<AnalysisResult>(raw).is_err());
    }
}

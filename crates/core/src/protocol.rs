//! Client-facing request and reply shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SubmitError;
use crate::id::JobId;
use crate::kind::AnalysisKind;

/// Raw request as received from a client connection.
///
/// Fields are optional here so that a missing field becomes a
/// [`SubmitError::Validation`] instead of an opaque parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub source_payload: Option<String>,
    #[serde(default)]
    pub analysis_kind: Option<String>,
    #[serde(default)]
    pub context: Option<JsonValue>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub kind: AnalysisKind,
    pub source_payload: String,
    pub context: Option<JsonValue>,
}

impl AnalysisRequest {
    pub fn new(kind: impl Into<String>, source_payload: impl Into<String>) -> Self {
        Self {
            source_payload: Some(source_payload.into()),
            analysis_kind: Some(kind.into()),
            context: None,
        }
    }

    /// Parse a text frame from a client.
    pub fn from_json(text: &str) -> Result<Self, SubmitError> {
        serde_json::from_str(text)
            .map_err(|e| SubmitError::validation(format!("invalid request JSON: {e}")))
    }

    /// Validate and normalize.
    ///
    /// The kind is checked first: a request naming an unknown kind is reported
    /// as such even when its payload is also missing.
    pub fn validate(self) -> Result<ValidatedRequest, SubmitError> {
        let kind = match self.analysis_kind.as_deref().map(str::trim) {
            None | Some("") => return Err(SubmitError::validation("analysis_kind is required")),
            Some(name) => name.parse::<AnalysisKind>()?,
        };

        let source_payload = match self.source_payload {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                return Err(SubmitError::validation(
                    "source_payload is required and must not be empty",
                ));
            }
        };

        Ok(ValidatedRequest {
            kind,
            source_payload,
            context: self.context,
        })
    }
}

/// Immediate acknowledgement: the job is queued (not completed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub status: String,
    pub job_id: JobId,
}

impl DispatchAck {
    pub fn new(job_id: JobId) -> Self {
        Self {
            status: "dispatched".to_string(),
            job_id,
        }
    }
}

/// Synchronous rejection of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl From<&SubmitError> for ErrorReply {
    fn from(err: &SubmitError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Sent when a job's deadline passes before any result arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryNotice {
    pub status: String,
    pub job_id: JobId,
    pub error: String,
}

impl ExpiryNotice {
    pub fn new(job_id: JobId) -> Self {
        Self {
            status: "expired".to_string(),
            job_id,
            error: "no result arrived before the job deadline".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn valid_security_request() {
        let req = AnalysisRequest::from_json(
            r#"{"source_payload": "contract X{}", "analysis_kind": "security", "context": {"a": 1}}"#,
        )
        .unwrap();
        let v = req.validate().unwrap();
        assert_eq!(v.kind, AnalysisKind::Security);
        assert_eq!(v.source_payload, "contract X{}");
        assert_eq!(v.context, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn empty_payload_is_a_validation_error() {
        let err = AnalysisRequest::new("security", "").validate().unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[test]
    fn unknown_kind_wins_over_missing_payload() {
        let req = AnalysisRequest::from_json(r#"{"analysis_kind": "nonexistent"}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, SubmitError::UnsupportedKind(_)));
        assert!(ErrorReply::from(&err).error.starts_with("Unknown analysis_kind"));
    }

    #[test]
    fn missing_kind_is_a_validation_error() {
        let req = AnalysisRequest::from_json(r#"{"source_payload": "x"}"#).unwrap();
        assert!(matches!(req.validate(), Err(SubmitError::Validation(_))));
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            AnalysisRequest::from_json("{not json"),
            Err(SubmitError::Validation(_))
        ));
    }

    #[test]
    fn ack_shape() {
        let id = JobId::new();
        let json = serde_json::to_value(DispatchAck::new(id)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "dispatched", "job_id": id.to_string()}));
    }

    proptest! {
        #[test]
        fn any_unlisted_kind_is_unsupported(kind in "[a-z_]{1,24}") {
            prop_assume!(AnalysisKind::supported_names().iter().all(|n| *n != kind));
            let err = AnalysisRequest::new(kind, "contract X {}").validate().unwrap_err();
            prop_assert!(matches!(err, SubmitError::UnsupportedKind(_)));
        }

        #[test]
        fn any_non_blank_payload_validates(payload in "[ a-z]{0,8}[a-zA-Z0-9{}();][ a-zA-Z0-9{}();]{0,40}", idx in 0usize..4) {
            let kind = AnalysisKind::ALL[idx];
            let v = AnalysisRequest::new(kind.as_str(), payload.clone()).validate().unwrap();
            prop_assert_eq!(v.kind, kind);
            prop_assert_eq!(v.source_payload, payload);
        }

        #[test]
        fn blank_payload_never_validates(payload in "[ \t\r\n]{0,8}") {
            let err = AnalysisRequest::new("security", payload).validate().unwrap_err();
            prop_assert!(matches!(err, SubmitError::Validation(_)));
        }
    }
}

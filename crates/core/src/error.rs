//! Submission error model.

use thiserror::Error;

use crate::kind::AnalysisKind;

/// Why a client request did not result in a dispatched job.
///
/// Every variant is surfaced synchronously to the requesting connection as
/// `{"error": <Display>}`. None of them leave a registry entry behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A required field was missing, empty, or the request was not valid JSON.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The declared analysis kind is not in the supported enumeration.
    #[error(
        "Unknown analysis_kind '{0}'; expected one of: {}",
        AnalysisKind::supported_names().join(", ")
    )]
    UnsupportedKind(String),

    /// The broker rejected the push after validation passed.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// The job envelope could not be encoded.
    #[error("failed to encode job: {0}")]
    Encode(String),
}

impl SubmitError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unsupported_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind(kind.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Stable machine-readable code (useful in logs).
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Validation(_) => "validation_error",
            SubmitError::UnsupportedKind(_) => "unsupported_kind",
            SubmitError::Dispatch(_) => "dispatch_error",
            SubmitError::Encode(_) => "encode_error",
        }
    }
}

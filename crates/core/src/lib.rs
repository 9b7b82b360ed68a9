//! `sentinel-core` — the shared job/result envelope and request model.
//!
//! This crate contains **pure data** (no broker, no sockets). Everything that
//! crosses a process boundary (client requests, job envelopes, result
//! envelopes, client replies) is defined here so that the dispatcher and every
//! worker agree on one encoding.

pub mod error;
pub mod id;
pub mod job;
pub mod kind;
pub mod protocol;
pub mod result;

pub use error::SubmitError;
pub use id::{ConnectionId, JobId};
pub use job::AnalysisJob;
pub use kind::{AnalysisKind, DEAD_LETTER_TOPIC, RESULT_TOPIC};
pub use protocol::{AnalysisRequest, DispatchAck, ErrorReply, ExpiryNotice, ValidatedRequest};
pub use result::{AnalysisOutput, AnalysisResult, ErrorDescriptor, ErrorKind};

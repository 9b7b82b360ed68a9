use tracing::error;

use sentinel_core::{ErrorReply, SubmitError};

/// Encode a submission error as the `{"error": ...}` frame clients expect.
pub fn error_frame(err: &SubmitError) -> String {
    match serde_json::to_string(&ErrorReply::from(err)) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "failed to encode error reply");
            r#"{"error":"internal error"}"#.to_string()
        }
    }
}

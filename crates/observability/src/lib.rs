//! Tracing/logging setup shared by the dispatcher and worker binaries.

/// Initialize process-wide logging for `service`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(service: &str) {
    tracing::init(service);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};

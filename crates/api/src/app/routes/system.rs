use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::app::services::AppServices;

/// GET /health
///
/// Liveness plus a snapshot of the correlation registry, queue depths and
/// loop counters.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    // Queue depths come from the broker, which is blocking IO.
    match tokio::task::spawn_blocking(move || services.health()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "health task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

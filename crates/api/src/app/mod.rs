//! Axum application wiring.
//!
//! - `services.rs`: broker selection, dispatcher, correlator and in-process workers
//! - `routes/`: the WebSocket endpoint and the health endpoint
//! - `errors.rs`: encoding of client-facing error frames

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/ws", get(routes::analysis::ws_handler))
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

//! GET /ws: analysis requests over WebSocket.
//!
//! Each text frame is one request. Replies on the same socket:
//! - `{"status":"dispatched","job_id":...}` immediately, or `{"error":...}`
//! - later, at most once per job, the worker's result verbatim
//!
//! Frames are handled in arrival order. Closing the socket does not cancel
//! dispatched jobs; their results are dropped by the correlator.

use std::sync::Arc;

use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use sentinel_core::SubmitError;
use sentinel_infra::ConnectionHandle;

use crate::app::errors::error_frame;
use crate::app::services::AppServices;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(services): Extension<Arc<AppServices>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, services))
}

async fn handle_socket(socket: WebSocket, services: Arc<AppServices>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (conn, mut outbound) = ConnectionHandle::channel();
    let connection_id = conn.id();
    info!(connection_id = %connection_id, "client connected");

    // Single writer: acks, errors and forwarded results all go through here.
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => submit_frame(&services, &conn, text).await,
            Ok(Message::Binary(bin)) => match String::from_utf8(bin) {
                Ok(text) => submit_frame(&services, &conn, text).await,
                Err(_) => reply_error(&conn, &SubmitError::validation("binary frame is not UTF-8 JSON")),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "websocket error");
                break;
            }
        }
    }

    // Dropping the receiver marks the connection closed for the correlator.
    writer.abort();
    info!(connection_id = %connection_id, "client disconnected");
}

async fn submit_frame(services: &Arc<AppServices>, conn: &ConnectionHandle, text: String) {
    let services = services.clone();
    let handle = conn.clone();
    // Broker IO is blocking.
    let submitted =
        tokio::task::spawn_blocking(move || services.dispatcher.submit_text(&text, &handle)).await;

    match submitted {
        Ok(Ok(ack)) => debug!(job_id = %ack.job_id, "acknowledged"),
        Ok(Err(e)) => {
            info!(connection_id = %conn.id(), code = e.code(), error = %e, "request rejected");
            reply_error(conn, &e);
        }
        Err(e) => {
            error!(connection_id = %conn.id(), error = %e, "dispatch task failed");
            reply_error(conn, &SubmitError::dispatch("internal error"));
        }
    }
}

fn reply_error(conn: &ConnectionHandle, err: &SubmitError) {
    if conn.send(error_frame(err)).is_err() {
        debug!(connection_id = %conn.id(), "client gone before error reply");
    }
}

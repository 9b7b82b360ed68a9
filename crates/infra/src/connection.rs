//! Handle to one client connection's outbound message stream.
//!
//! The transport (WebSocket, in tests a plain channel receiver) owns the
//! receiving side; the dispatcher and the result correlator only ever see a
//! [`ConnectionHandle`]. A connection counts as closed once its receiver is
//! dropped.

use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use sentinel_core::ConnectionId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub ConnectionId);

/// Cloneable sender half of a client connection.
///
/// Sending never blocks. Ordering between a job's acknowledgement and its
/// result is handled by the job's registration, not here.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: UnboundedSender<String>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver the transport drains.
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let handle = Self {
            id: ConnectionId::new(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue one text message for the client.
    pub fn send(&self, text: String) -> Result<(), ConnectionClosed> {
        self.tx.send(text).map_err(|_| ConnectionClosed(self.id))
    }
}

//! Per-connection handles: the immutable connection context and the outbound queue.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::directory::UserIdentity;

/// Opaque, process-unique connection identifier (`conn_` prefixed ULID).
pub type ConnectionId = String;

/// A serialized event, shared between every recipient of one broadcast.
pub type Frame = Arc<str>;

/// Immutable record of an admitted connection, handed to every event handler.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub user: Arc<UserIdentity>,
}

impl ConnectionContext {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection's queue is full; the frame is dropped.
    Full,
    /// The connection's writer has gone away.
    Closed,
}

/// Sending half of a connection's bounded outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a frame without waiting. Never blocks the broadcasting caller.
    pub fn try_deliver(&self, frame: &Frame) -> Result<(), DeliveryError> {
        self.tx.try_send(Arc::clone(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

//! Connection handles
//!
//! A `ConnectionHandle` is the relay's view of one client session: its id,
//! the room it was placed in at connect time, and the channel its writer
//! task drains.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::RelayEvent;

/// Handle to a client connection for sending events
///
/// Cloning is cheap; every clone refers to the same outbound channel.
/// Equality and hashing only look at the connection id.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Arc<str>,
    room: Arc<str>,
    addr: Option<SocketAddr>,
    sender: mpsc::UnboundedSender<RelayEvent>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh UUID v4 id
    pub fn new(
        room: impl Into<String>,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), room, addr, sender)
    }

    /// Create a handle with a specific id
    pub fn with_id(
        id: impl Into<String>,
        room: impl Into<String>,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<RelayEvent>,
    ) -> Self {
        Self {
            id: Arc::from(id.into()),
            room: Arc::from(room.into()),
            addr,
            sender,
        }
    }

    /// Get connection ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Room this connection was placed in
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Peer address, when the transport knows it
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Send an event to this connection
    pub fn send(&self, event: RelayEvent) -> Result<(), ConnectionError> {
        self.sender.send(event).map_err(|_| ConnectionError::Closed)
    }

    /// Emit a named payload, stamped with `sent_at`
    pub fn emit(
        &self,
        event: &str,
        payload: &str,
        sent_at: DateTime<FixedOffset>,
    ) -> Result<(), ConnectionError> {
        self.send(RelayEvent::Emit {
            event: event.to_string(),
            payload: payload.to_string(),
            sent_at,
        })
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Connection-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
}

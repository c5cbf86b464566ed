//! Connect / message / disconnect handlers
//!
//! Each transport event runs one of these synchronously to completion.

use std::sync::Arc;

use roomcast_config::RelayConfig;
use tracing::{info, warn};

use crate::clock::ZoneClock;
use crate::connection::ConnectionHandle;
use crate::registry::{RegistryError, RoomRegistry};
use crate::sanitize::sanitize_with_limit;

/// Relay event handlers sharing one registry
#[derive(Debug, Clone)]
pub struct ChatHandler {
    registry: Arc<RoomRegistry>,
    clock: ZoneClock,
    event_name: String,
    max_message_chars: usize,
    echo_to_sender: bool,
}

impl ChatHandler {
    pub fn new(registry: Arc<RoomRegistry>, config: &RelayConfig) -> Self {
        Self {
            registry,
            clock: ZoneClock::new(config.timezone.clone()),
            event_name: config.event_name.clone(),
            max_message_chars: config.max_message_chars,
            echo_to_sender: config.echo_to_sender,
        }
    }

    /// Build a handler and a registry capped at `config.max_connections`
    pub fn from_config(config: &RelayConfig) -> Self {
        let registry = Arc::new(RoomRegistry::with_max_connections(config.max_connections));
        Self::new(registry, config)
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &ZoneClock {
        &self.clock
    }

    /// Log the new connection and place it in its room
    pub fn on_connect(&self, conn: &ConnectionHandle) -> Result<(), RelayError> {
        info!(
            "Client connected: {} from {} (room: {})",
            conn.id(),
            peer(conn),
            conn.room()
        );

        match self.registry.join(conn) {
            Ok(_) => Ok(()),
            Err(RegistryError::Full(max)) => {
                warn!("Registry full ({}), rejecting {}", max, conn.id());
                Err(RelayError::CapacityExceeded(max))
            }
        }
    }

    /// Sanitize `msg` and broadcast it to the sender's room
    ///
    /// Returns how many connections the message was handed to.
    pub fn on_message(&self, conn: &ConnectionHandle, msg: &str) -> usize {
        let msg = sanitize_with_limit(msg, self.max_message_chars);
        info!("Received message from {}: {}", conn.id(), msg);

        let outbound = format_chat_line(conn.id(), &msg);
        let sent_at = self.clock.now();
        if self.echo_to_sender {
            self.registry
                .broadcast(conn.room(), &self.event_name, &outbound, sent_at)
        } else {
            self.registry.broadcast_except(
                conn.room(),
                &self.event_name,
                &outbound,
                sent_at,
                conn.id(),
            )
        }
    }

    /// Log the disconnect and drop the connection from its room
    pub fn on_disconnect(&self, conn: &ConnectionHandle, reason: &str) {
        info!(
            "Client disconnected: {} from {} (Reason: {})",
            conn.id(),
            peer(conn),
            reason
        );
        self.registry.remove(conn.id(), conn.room());
    }
}

fn peer(conn: &ConnectionHandle) -> String {
    conn.addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `"<connection-id> says: <text>"`
pub fn format_chat_line(connection_id: &str, text: &str) -> String {
    format!("{} says: {}", connection_id, text)
}

/// Handler-level errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Server at capacity ({0} connections)")]
    CapacityExceeded(usize),
}

impl RelayError {
    /// Code sent to the client in the `error` event
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
        }
    }
}

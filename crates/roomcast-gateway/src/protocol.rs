//! WebSocket protocol definitions
//!
//! Defines the message types for client-relay communication.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Messages sent from client to relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Chat text for the sender's room
    ChatMessage {
        /// Raw, unsanitized text
        content: String,
    },
    /// Heartbeat ping
    Ping {
        /// Client timestamp
        timestamp: i64,
    },
}

/// Events sent from relay to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Connection accepted and placed in a room
    Connected {
        connection_id: String,
        room: String,
    },
    /// Named payload pushed to the client
    Emit {
        /// Event name, e.g. `chat message`
        event: String,
        payload: String,
        sent_at: DateTime<FixedOffset>,
    },
    /// Error response
    Error {
        /// Error code
        code: String,
        /// Error message
        message: String,
    },
    /// Heartbeat pong
    Pong {
        /// Original timestamp
        timestamp: i64,
    },
}

impl RelayEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        RelayEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

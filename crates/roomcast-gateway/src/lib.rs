//! Roomcast Gateway - room-scoped WebSocket chat relay
//!
//! Clients connect to `/ws?room=<key>`, are placed in that room, and every
//! chat message they send is sanitized and broadcast to the room's members.

mod clock;
mod connection;
mod gateway;
mod handler;
mod protocol;
mod registry;
mod sanitize;

pub use clock::ZoneClock;
pub use connection::{ConnectionError, ConnectionHandle};
pub use gateway::{Gateway, GatewayConfig, GatewayError, MAX_ROOM_CHARS};
pub use handler::{format_chat_line, ChatHandler, RelayError};
pub use protocol::{ClientMessage, RelayEvent};
pub use registry::{RegistryError, RoomRegistry};
pub use sanitize::{
    sanitize, sanitize_with_limit, strip_html_tags, truncate_chars, DEFAULT_MAX_CHARS,
};

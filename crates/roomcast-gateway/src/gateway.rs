//! Gateway main structure
//!
//! The HTTP server: upgrades `/ws` to a WebSocket, feeds socket events into
//! the [`ChatHandler`], and serves the static client for everything else.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use roomcast_config::Config;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionHandle;
use crate::handler::{ChatHandler, RelayError};
use crate::protocol::{ClientMessage, RelayEvent};
use crate::sanitize::truncate_chars;

/// Longest room key accepted from a client, in code points
pub const MAX_ROOM_CHARS: usize = 64;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:3000")
    pub bind: String,
    /// Directory served for non-WebSocket paths
    pub static_dir: PathBuf,
    /// Room for clients that do not ask for one
    pub default_room: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GatewayConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind: config.bind_addr(),
            static_dir: PathBuf::from(&config.server.static_dir),
            default_room: config.relay.default_room.clone(),
        }
    }
}

/// The main Gateway server
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
    handler: ChatHandler,
}

impl Gateway {
    /// Create a new Gateway instance
    pub fn new(config: GatewayConfig, handler: ChatHandler) -> Self {
        Self { config, handler }
    }

    /// Gateway and handler from the full application config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            GatewayConfig::from_config(config),
            ChatHandler::from_config(&config.relay),
        )
    }

    pub fn handler(&self) -> &ChatHandler {
        &self.handler
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Routes: `/ws`, `/health`, static files
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(websocket_handler))
            .route("/health", get(health_handler))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(self.clone()))
    }

    /// Bind the configured address and serve until the listener fails
    ///
    /// ```no_run
    /// use roomcast_config::Config;
    /// use roomcast_gateway::Gateway;
    ///
    /// # async fn start() -> Result<(), roomcast_gateway::GatewayError> {
    /// let gateway = Gateway::from_config(&Config::default());
    /// gateway.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        info!("Gateway listening on http://{}", listener.local_addr()?);
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Room key for a connect request: trimmed, capped, default when blank
    pub fn resolve_room(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(room) if !room.is_empty() => truncate_chars(room, MAX_ROOM_CHARS).to_string(),
            _ => self.config.default_room.clone(),
        }
    }

    /// Handle a WebSocket connection
    async fn handle_socket(&self, socket: WebSocket, addr: SocketAddr, room: String) {
        let (mut sender, mut receiver) = socket.split();

        // Channel for sending events to this connection
        let (tx, mut rx) = mpsc::unbounded_channel::<RelayEvent>();
        let conn = ConnectionHandle::new(room, Some(addr), tx);

        if let Err(e) = self.admit(&conn) {
            let event = RelayEvent::error(e.code(), e.to_string());
            match serde_json::to_string(&event) {
                Ok(json) => {
                    let _ = sender.send(Message::Text(json)).await;
                }
                Err(e) => error!("Failed to serialize event: {}", e),
            }
            let _ = sender.close().await;
            return;
        }

        let reason = loop {
            tokio::select! {
                // Handle outgoing events
                Some(event) = rx.recv() => {
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if let Err(e) = sender.send(Message::Text(json)).await {
                                error!("Failed to send to {}: {}", addr, e);
                                break format!("transport error: {}", e);
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                        }
                    }
                }

                // Handle incoming frames
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&conn, &text),
                        Some(Ok(Message::Close(frame))) => break close_reason(frame),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("WebSocket error on {}: {}", addr, e);
                            break format!("transport error: {}", e);
                        }
                        None => break "transport close".to_string(),
                    }
                }
            }
        };

        self.handler.on_disconnect(&conn, &reason);
    }

    /// Queue the `connected` event, then join the room. Once joined, room
    /// broadcasts can land in the channel, so `connected` must already be there.
    fn admit(&self, conn: &ConnectionHandle) -> Result<(), RelayError> {
        let _ = conn.send(RelayEvent::Connected {
            connection_id: conn.id().to_string(),
            room: conn.room().to_string(),
        });
        self.handler.on_connect(conn)
    }

    fn handle_text(&self, conn: &ConnectionHandle, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::ChatMessage { content }) => {
                self.handler.on_message(conn, &content);
            }
            Ok(ClientMessage::Ping { timestamp }) => {
                let _ = conn.send(RelayEvent::Pong { timestamp });
            }
            Err(e) => {
                warn!("Invalid message from {}: {}", conn.id(), e);
                let _ = conn.send(RelayEvent::error(
                    "INVALID_MESSAGE",
                    format!("Failed to parse message: {}", e),
                ));
            }
        }
    }
}

fn close_reason(frame: Option<CloseFrame<'static>>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => frame.reason.into_owned(),
        Some(frame) => format!("client closed ({})", frame.code),
        None => "client closed".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    room: Option<String>,
}

/// WebSocket 处理器
async fn websocket_handler(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let room = gateway.resolve_room(params.room.as_deref());
    ws.on_upgrade(move |socket| async move { gateway.handle_socket(socket, addr, room).await })
}

/// 健康检查处理器
async fn health_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let registry = gateway.handler.registry();
    Json(json!({
        "status": "healthy",
        "rooms": registry.room_count(),
        "connections": registry.connection_count(),
        "timestamp": gateway.handler.clock().now().to_rfc3339(),
    }))
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway({})", self.config.bind)
    }
}

/// Gateway-related errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

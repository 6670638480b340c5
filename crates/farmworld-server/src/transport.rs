//! `WebSocket` transport between clients and the tick loop.
//!
//! Each client connects to `GET /ws`. Text frames from the client are
//! decoded as [`ClientMessage`]s and queued for the next tick. The tick
//! answers through [`WsTransport`], which looks up the connection's
//! outbound queue and never blocks.
//!
//! Outbound frames carry the delivery class next to the message:
//!
//! ```json
//! {"reliability":"ReliableSequenced","message":{"type":"PlayerTransform", ...}}
//! ```
//!
//! A `WebSocket` is already ordered and reliable, so the class is advisory;
//! clients use it to drop stale sequenced updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use farmworld_core::broadcast::Transport;
use farmworld_core::dispatch::InboundEvent;
use farmworld_types::{ClientMessage, ConnectionId, Reliability, ServerMessage};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One outbound frame as it goes on the wire.
#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    reliability: Reliability,
    message: &'a ServerMessage,
}

// ---------------------------------------------------------------------------
// Connection table
// ---------------------------------------------------------------------------

/// Live connections and their outbound queues.
#[derive(Debug)]
pub struct ConnectionTable {
    next_id: AtomicU64,
    max_clients: usize,
    senders: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

impl ConnectionTable {
    /// Create an empty table admitting at most `max_clients` connections.
    pub fn new(max_clients: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            max_clients,
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a new connection, or `None` if the table is full.
    pub fn register(&self) -> Option<(ConnectionId, mpsc::UnboundedReceiver<String>)> {
        let mut senders = self.senders.lock().ok()?;
        if senders.len() >= self.max_clients {
            return None;
        }
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(id, tx);
        Some((id, rx))
    }

    /// Forget a connection. Queued frames are dropped.
    pub fn unregister(&self, id: ConnectionId) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.remove(&id);
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.senders.lock().map_or(0, |s| s.len())
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether another connection would be refused.
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_clients
    }

    fn push(&self, id: ConnectionId, frame: String) -> bool {
        self.senders
            .lock()
            .ok()
            .and_then(|senders| senders.get(&id).map(|tx| tx.send(frame).is_ok()))
            .unwrap_or(false)
    }
}

/// [`Transport`] that writes into the [`ConnectionTable`].
#[derive(Debug, Clone)]
pub struct WsTransport {
    connections: Arc<ConnectionTable>,
}

impl WsTransport {
    /// Send through `connections`.
    pub const fn new(connections: Arc<ConnectionTable>) -> Self {
        Self { connections }
    }
}

impl Transport for WsTransport {
    fn send(&self, connection: ConnectionId, message: &ServerMessage, reliability: Reliability) {
        let frame = OutboundFrame {
            reliability,
            message,
        };
        let json = match serde_json::to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                warn!(message = message.name(), "Failed to serialize outbound frame: {e}");
                return;
            }
        };
        if !self.connections.push(connection, json) {
            debug!(
                connection = %connection,
                message = message.name(),
                "Dropped frame for closed connection"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket handler
// ---------------------------------------------------------------------------

/// Shared state handed to the `/ws` route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connections.
    pub connections: Arc<ConnectionTable>,
    /// Queue read by the tick loop.
    pub inbox: mpsc::UnboundedSender<InboundEvent>,
}

/// Upgrade an HTTP request to a client `WebSocket`.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_client(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.connections.is_full() {
        warn!("Connection refused: server full");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: forward inbound frames to the tick
/// loop and outbound frames to the socket until either side closes.
async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let Some((connection, mut outbound)) = state.connections.register() else {
        warn!("Connection refused: server full");
        return;
    };
    info!(connection = %connection, "Client connected");
    if state.inbox.send(InboundEvent::Connected(connection)).is_err() {
        state.connections.unregister(connection);
        return;
    }

    loop {
        tokio::select! {
            // A frame produced by the tick.
            frame = outbound.recv() => {
                let Some(json) = frame else {
                    break;
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(connection = %connection, "Send failed");
                    break;
                }
            }
            // Something from the client.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => {
                                let event = InboundEvent::Message { connection, message };
                                if state.inbox.send(event).is_err() {
                                    debug!("Tick loop gone, closing connection");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(connection = %connection, "Undecodable client frame: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(connection = %connection, "WebSocket error: {e}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us.
                    }
                }
            }
        }
    }

    state.connections.unregister(connection);
    // The tick loop may already be gone during shutdown.
    let _ = state.inbox.send(InboundEvent::Disconnected(connection));
    info!(connection = %connection, "Client disconnected");
}

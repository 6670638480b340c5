//! Outbound message fan-out.
//!
//! The core never touches sockets. It hands each message to a [`Transport`]
//! together with the delivery class the message requires, and the
//! [`BroadcastRouter`] decides which connections receive it.

use std::sync::{Arc, Mutex};

use farmworld_types::{ConnectionId, Reliability, ServerMessage};

use crate::session::{SessionId, SessionRegistry};

/// Per-connection delivery of outbound messages.
///
/// Implementations must not block: a slow client is the transport's
/// problem, not the tick's.
pub trait Transport: Send {
    /// Queue `message` for delivery to `connection` with `reliability`.
    fn send(&self, connection: ConnectionId, message: &ServerMessage, reliability: Reliability);
}

/// Routes messages to all, all-but-one, or a single session.
pub struct BroadcastRouter {
    transport: Box<dyn Transport>,
    sent: u64,
}

impl core::fmt::Debug for BroadcastRouter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BroadcastRouter")
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl BroadcastRouter {
    /// Wrap a transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport, sent: 0 }
    }

    /// Total messages handed to the transport since creation.
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Send to one connection, logged in or not.
    pub fn to_connection(&mut self, connection: ConnectionId, message: &ServerMessage) {
        self.transport
            .send(connection, message, message.reliability());
        self.sent = self.sent.saturating_add(1);
    }

    /// Send to one session. Unknown sessions are ignored.
    pub fn to_session(
        &mut self,
        sessions: &SessionRegistry,
        id: SessionId,
        message: &ServerMessage,
    ) {
        if let Some(session) = sessions.get(id) {
            self.to_connection(session.connection, message);
        }
    }

    /// Send to every logged-in session.
    pub fn to_all(&mut self, sessions: &SessionRegistry, message: &ServerMessage) {
        for (_, session) in sessions.iter() {
            self.to_connection(session.connection, message);
        }
    }

    /// Send to every logged-in session except `except`.
    pub fn to_others(
        &mut self,
        sessions: &SessionRegistry,
        except: SessionId,
        message: &ServerMessage,
    ) {
        for (id, session) in sessions.iter() {
            if id != except {
                self.to_connection(session.connection, message);
            }
        }
    }
}

/// One message captured by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Destination.
    pub connection: ConnectionId,
    /// Payload.
    pub message: ServerMessage,
    /// Delivery class requested.
    pub reliability: Reliability,
}

/// Transport that keeps every message in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give
/// the other to the router.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }

    /// Messages recorded for `connection`, without removing them.
    pub fn sent_to(&self, connection: ConnectionId) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|m| m.connection == connection)
                    .map(|m| m.message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, connection: ConnectionId, message: &ServerMessage, reliability: Reliability) {
        if let Ok(mut guard) = self.sent.lock() {
            guard.push(SentMessage {
                connection,
                message: message.clone(),
                reliability,
            });
        }
    }
}

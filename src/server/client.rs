//! Transport-independent handling of one client connection.
//!
//! A client connection hosts at most one [`ChatSession`] at a time. Joining
//! while joined leaves the current room first. Chat traffic for the session
//! is forwarded from its outbound stream to the connection's writer by a
//! dedicated task, so delivery never waits on the inbound loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::chat::{BroadcastEngine, ChatMessage, ChatSession};
use crate::RelayError;

/// Per-connection request dispatcher shared by all transports.
pub struct ClientConnection {
    engine: Arc<BroadcastEngine>,
    outbound: mpsc::Sender<ServerMessage>,
    session: Option<ChatSession>,
    forwarder: Option<JoinHandle<()>>,
}

impl ClientConnection {
    /// Create a dispatcher writing replies to `outbound`.
    pub fn new(engine: Arc<BroadcastEngine>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            engine,
            outbound,
            session: None,
            forwarder: None,
        }
    }

    /// Connection id of the current session, if joined.
    pub fn connection_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.connection_id())
    }

    /// Parse and handle one raw text frame or line.
    pub async fn handle_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                debug!("Failed to parse client message: {}", e);
                self.reply(ServerMessage::error(
                    "invalid_message",
                    "Invalid message format",
                ))
                .await;
            }
        }
    }

    /// Handle one client message.
    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Join {
                room,
                name,
                connection_id,
            } => {
                let room = room.unwrap_or_else(|| self.engine.config().default_room.clone());
                let connection_id = connection_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                self.join(&room, connection_id, name).await;
            }
            ClientMessage::Send { text } => {
                let result = match &self.session {
                    Some(session) => session.send(&text).await,
                    None => Err(RelayError::NotJoined),
                };
                if let Err(e) = result {
                    self.reply(ServerMessage::from(&e)).await;
                }
            }
            ClientMessage::Leave => match self.leave_current().await {
                Some(room) => self.reply(ServerMessage::Left { room }).await,
                None => self.reply(ServerMessage::from(&RelayError::NotJoined)).await,
            },
            ClientMessage::List => {
                let rooms = self.engine.hub().list_rooms().await;
                self.reply(ServerMessage::room_list(rooms)).await;
            }
            ClientMessage::Ping => self.reply(ServerMessage::Pong).await,
        }
    }

    async fn join(&mut self, room: &str, connection_id: String, name: String) {
        if let Some(previous) = self.leave_current().await {
            self.reply(ServerMessage::Left { room: previous }).await;
        }

        let mut session = ChatSession::new(Arc::clone(&self.engine), connection_id, name);
        match session.join(room).await {
            Ok(stream) => {
                let joined = ServerMessage::Joined {
                    room: room.to_string(),
                    connection_id: session.connection_id().to_string(),
                };
                self.reply(joined).await;
                self.forwarder = Some(tokio::spawn(forward(stream, self.outbound.clone())));
                self.session = Some(session);
            }
            Err(e) => self.reply(ServerMessage::from(&e)).await,
        }
    }

    /// Leave the current room, returning its name.
    async fn leave_current(&mut self) -> Option<String> {
        let session = self.session.take()?;
        let room = session.room().map(str::to_string);
        session.leave().await;

        // The handle is released, so the forwarder drains what is queued and
        // stops; waiting keeps those messages ahead of the `left` reply.
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
        room
    }

    /// Send an error reply without touching the session.
    pub async fn reject(&self, error: &RelayError) {
        self.reply(ServerMessage::from(error)).await;
    }

    async fn reply(&self, msg: ServerMessage) {
        if self.outbound.send(msg).await.is_err() {
            debug!("Reply dropped, writer has stopped");
        }
    }

    /// Run disconnect cleanup for the current session.
    pub async fn close(mut self) {
        if let Some(room) = self.leave_current().await {
            debug!("Connection closed while in room {}", room);
        }
    }
}

/// Copy a session's outbound stream to the connection writer until either
/// side ends.
async fn forward(mut stream: mpsc::Receiver<ChatMessage>, outbound: mpsc::Sender<ServerMessage>) {
    while let Some(msg) = stream.recv().await {
        if outbound.send(ServerMessage::from(msg)).await.is_err() {
            break;
        }
    }
}

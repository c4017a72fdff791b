//! Wire messages shared by the TCP and WebSocket transports.
//!
//! Every message is a JSON object tagged by `type`. Over TCP each message is
//! one line; over WebSocket each message is one text frame.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, MessageKind, RoomSummary};
use crate::RelayError;

/// Display name used when a join request does not carry one.
pub const DEFAULT_NAME: &str = "anon";

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (creating if needed) a room.
    Join {
        /// Room name; the configured default room when omitted.
        #[serde(default)]
        room: Option<String>,
        /// Display name.
        #[serde(default = "default_name")]
        name: String,
        /// Connection id; generated when omitted.
        #[serde(default)]
        connection_id: Option<String>,
    },
    /// Send text to the current room.
    Send {
        /// Message text.
        text: String,
    },
    /// Leave the current room.
    Leave,
    /// List rooms.
    List,
    /// Heartbeat ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Joined a room.
    Joined {
        /// Room name.
        room: String,
        /// Connection id assigned to this session.
        connection_id: String,
    },
    /// Left a room.
    Left {
        /// Room name.
        room: String,
    },
    /// Chat message from another member.
    Chat {
        /// Sender's connection id.
        sender_id: String,
        /// Sender's display name.
        sender_name: String,
        /// Message text.
        text: String,
        /// RFC 3339 timestamp assigned by the server.
        timestamp: String,
    },
    /// Another member joined the room.
    UserJoined {
        /// Display name.
        name: String,
        /// RFC 3339 timestamp.
        timestamp: String,
    },
    /// Another member left the room.
    UserLeft {
        /// Display name.
        name: String,
        /// RFC 3339 timestamp.
        timestamp: String,
    },
    /// Room listing.
    RoomList {
        /// Current rooms.
        rooms: Vec<RoomInfo>,
    },
    /// Error reply.
    Error {
        /// Error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
    /// Heartbeat pong response.
    Pong,
}

/// Room entry in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    /// Room name.
    pub name: String,
    /// Number of members.
    pub member_count: usize,
}

impl From<RoomSummary> for RoomInfo {
    fn from(summary: RoomSummary) -> Self {
        Self {
            name: summary.name,
            member_count: summary.member_count,
        }
    }
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a room listing.
    pub fn room_list(rooms: Vec<RoomSummary>) -> Self {
        Self::RoomList {
            rooms: rooms.into_iter().map(RoomInfo::from).collect(),
        }
    }
}

impl From<&RelayError> for ServerMessage {
    fn from(err: &RelayError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

impl From<ChatMessage> for ServerMessage {
    fn from(msg: ChatMessage) -> Self {
        let timestamp = msg.timestamp.to_rfc3339();
        match msg.kind {
            MessageKind::Chat => Self::Chat {
                sender_id: msg.sender_id,
                sender_name: msg.sender_name,
                text: msg.text,
                timestamp,
            },
            MessageKind::Join => Self::UserJoined {
                name: msg.sender_name,
                timestamp,
            },
            MessageKind::Leave => Self::UserLeft {
                name: msg.sender_name,
                timestamp,
            },
        }
    }
}

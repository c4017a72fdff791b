//! Messages delivered to room members.

use chrono::{DateTime, Utc};

/// Kind of message carried on an outbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Text sent by a member.
    Chat,
    /// A member joined the room.
    Join,
    /// A member left the room.
    Leave,
}

impl MessageKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message routed to the members of one room.
///
/// The timestamp is assigned by the server when the message is routed, not
/// when the client sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sender's connection id.
    pub sender_id: String,
    /// Sender's display name.
    pub sender_name: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Raw text; empty for membership notices.
    pub text: String,
    /// Routing timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a chat message stamped with the current time.
    pub fn new(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            kind: MessageKind::Chat,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a join notice.
    pub fn join(sender_id: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Join,
            ..Self::new(sender_id, sender_name, String::new())
        }
    }

    /// Create a leave notice.
    pub fn leave(sender_id: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Leave,
            ..Self::new(sender_id, sender_name, String::new())
        }
    }

    /// Format the message as a single display line.
    pub fn format(&self) -> String {
        match self.kind {
            MessageKind::Chat => format!("{}: {}", self.sender_name, self.text),
            MessageKind::Join => format!("*** {} joined", self.sender_name),
            MessageKind::Leave => format!("*** {} left", self.sender_name),
        }
    }
}

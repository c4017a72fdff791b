//! Error types for the chat relay.

use thiserror::Error;

/// Common error type for the chat relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A connection id is already registered somewhere in the relay.
    #[error("duplicate connection: {0} is already registered")]
    DuplicateConnection(String),

    /// The connection is not a member of any room.
    #[error("no room found for connection {0}")]
    RoomNotFound(String),

    /// The outbound stream of a connection is no longer usable.
    #[error("outbound handle for connection {0} is gone")]
    HandleGone(String),

    /// Room name rejected by validation.
    #[error("invalid room name: {0}")]
    InvalidRoomName(String),

    /// Message text exceeds the configured maximum.
    #[error("message too long: {len} characters (max {max})")]
    MessageTooLong {
        /// Length of the rejected message in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// An inbound frame exceeds the transport limit before it can be parsed.
    #[error("frame too long (max {max} bytes)")]
    FrameTooLong {
        /// Frame limit in bytes.
        max: usize,
    },

    /// Operation requires a joined session.
    #[error("not joined to a room")]
    NotJoined,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),
}

impl RelayError {
    /// Machine-readable code sent to clients in error replies.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::DuplicateConnection(_) => "duplicate_connection",
            RelayError::RoomNotFound(_) => "room_not_found",
            RelayError::HandleGone(_) => "handle_gone",
            RelayError::InvalidRoomName(_) => "invalid_room_name",
            RelayError::MessageTooLong { .. } | RelayError::FrameTooLong { .. } => {
                "message_too_long"
            }
            RelayError::NotJoined => "not_in_room",
            RelayError::Io(_) => "io_error",
            RelayError::Json(_) => "invalid_message",
            RelayError::Config(_) => "config_error",
            RelayError::Validation(_) => "validation_error",
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

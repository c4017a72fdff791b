//! TCP transport.
//!
//! This module provides the listener, the per-connection line protocol, and
//! the wire messages shared with the WebSocket endpoint.

pub mod client;
mod connection;
mod listener;
pub mod protocol;

pub use client::ClientConnection;
pub use connection::handle_connection;
pub use listener::ChatServer;
pub use protocol::{ClientMessage, RoomInfo, ServerMessage};

//! chatrelay - real-time group chat relay.
//!
//! Clients join named rooms and exchange short text messages; every message
//! is fanned out to the other members of the sender's room.

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod web;

pub use chat::{
    BroadcastEngine, ChatHub, ChatMessage, ChatSession, ConnectionHandle, ConnectionState,
    MessageKind, Registration, RoomSummary, RouteReport,
};
pub use config::Config;
pub use error::{RelayError, Result};
pub use server::{ChatServer, ClientMessage, ServerMessage};

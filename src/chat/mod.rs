//! Room registry and broadcast engine.
//!
//! This module provides the relay core:
//! - Room membership (create on first join, remove on last leave)
//! - Outbound handles owned by a delivery table
//! - Fan-out of messages to the other members of the sender's room
//! - Per-connection lifecycle with cleanup that runs exactly once

mod engine;
mod handle;
mod hub;
mod lifecycle;
mod message;
mod registry;

pub use engine::{BroadcastEngine, RouteReport};
pub use handle::{ConnectionHandle, DeliveryError, DeliveryTable, Registration};
pub use hub::{ChatHub, Departure, RoomSnapshot};
pub use lifecycle::{validate_room_name, ChatSession, ConnectionState};
pub use message::{ChatMessage, MessageKind};
pub use registry::{Room, RoomRegistry, RoomSummary};

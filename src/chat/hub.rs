//! Shared relay state behind a single lock.
//!
//! [`ChatHub`] owns the [`RoomRegistry`] and the [`DeliveryTable`] together so
//! that membership, room existence and handle ownership are only ever changed
//! in one step. Delivery never happens while the lock is held: readers take a
//! snapshot of peer handles and deliver after releasing it.

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::handle::{ConnectionHandle, DeliveryTable, Registration};
use super::registry::{RoomRegistry, RoomSummary};
use crate::{RelayError, Result};

#[derive(Debug, Default)]
struct HubState {
    registry: RoomRegistry,
    handles: DeliveryTable,
}

/// A connection removed from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Connection id.
    pub connection_id: String,
    /// Display name.
    pub name: String,
    /// Room the connection left.
    pub room: String,
}

/// Peers of a connection captured under the lock.
#[derive(Debug)]
pub struct RoomSnapshot {
    /// Room name.
    pub room: String,
    /// Display name of the connection the snapshot was taken for.
    pub name: String,
    /// Every other member with a sending reference to its outbound stream.
    pub peers: Vec<(String, ConnectionHandle)>,
}

/// Registry and delivery table shared by every connection.
#[derive(Debug, Default)]
pub struct ChatHub {
    state: RwLock<HubState>,
}

impl ChatHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and add it to a room.
    ///
    /// Both the membership index and the delivery table are checked before
    /// either is touched, so a rejected join leaves the hub unchanged. The
    /// returned token is required to remove this registration later.
    pub async fn join(
        &self,
        room_name: &str,
        connection_id: &str,
        name: &str,
        handle: ConnectionHandle,
    ) -> Result<Registration> {
        let mut state = self.state.write().await;
        if state.registry.is_registered(connection_id) || state.handles.contains(connection_id) {
            return Err(RelayError::DuplicateConnection(connection_id.to_string()));
        }

        state.registry.create_or_join(room_name, connection_id)?;
        let registration = state.handles.register(connection_id, name, handle)?;
        info!("{} ({}) joined room {}", name, connection_id, room_name);
        Ok(registration)
    }

    /// Unregister a connection's handle, then remove it from its room.
    ///
    /// Only the registration identified by `registration` is removed; returns
    /// None when the id is unregistered or now belongs to a later join.
    pub async fn leave(
        &self,
        connection_id: &str,
        registration: Registration,
    ) -> Option<Departure> {
        let mut state = self.state.write().await;
        if state.handles.registration_of(connection_id) != Some(registration) {
            debug!("Stale leave for {} ignored", connection_id);
            return None;
        }
        Self::remove(&mut state, connection_id)
    }

    /// Remove connections whose outbound stream has been closed by the peer.
    ///
    /// Ids that are registered with a live handle are left alone.
    pub async fn evict_closed(&self, connection_ids: &[String]) -> Vec<Departure> {
        let mut state = self.state.write().await;
        let closed: Vec<&String> = connection_ids
            .iter()
            .filter(|id| state.handles.is_closed(id))
            .collect();
        closed
            .into_iter()
            .filter_map(|id| Self::remove(&mut state, id))
            .collect()
    }

    fn remove(state: &mut HubState, connection_id: &str) -> Option<Departure> {
        let name = state.handles.unregister(connection_id);
        let room = state.registry.leave(connection_id);
        match (name, room) {
            (Some(name), Some(room)) => {
                info!("{} ({}) left room {}", name, connection_id, room);
                Some(Departure {
                    connection_id: connection_id.to_string(),
                    name,
                    room,
                })
            }
            (None, None) => None,
            (name, room) => {
                // Only reachable if the two maps diverged; both are now clear.
                debug!(
                    "Partial registration for {}: name={:?} room={:?}",
                    connection_id, name, room
                );
                None
            }
        }
    }

    /// Snapshot the other members of a connection's room.
    pub async fn peers_of(&self, connection_id: &str) -> Result<RoomSnapshot> {
        let state = self.state.read().await;
        let room = state.registry.room_of(connection_id)?;
        let name = state
            .handles
            .name_of(connection_id)
            .ok_or_else(|| RelayError::HandleGone(connection_id.to_string()))?
            .to_string();
        let peers = state
            .handles
            .peers(room.members().filter(|id| id.as_str() != connection_id));

        Ok(RoomSnapshot {
            room: room.name().to_string(),
            name,
            peers,
        })
    }

    /// Snapshot the members of a room, excluding one connection.
    pub async fn members_of(&self, room_name: &str, except: &str) -> Vec<(String, ConnectionHandle)> {
        let state = self.state.read().await;
        match state.registry.get(room_name) {
            Some(room) => state
                .handles
                .peers(room.members().filter(|id| id.as_str() != except)),
            None => Vec::new(),
        }
    }

    /// List all rooms with their member counts.
    pub async fn list_rooms(&self) -> Vec<RoomSummary> {
        self.state.read().await.registry.list_rooms()
    }

    /// Name of the room a connection belongs to.
    pub async fn room_of(&self, connection_id: &str) -> Result<String> {
        let state = self.state.read().await;
        state
            .registry
            .room_of(connection_id)
            .map(|room| room.name().to_string())
    }

    /// Check if a connection is registered.
    pub async fn is_registered(&self, connection_id: &str) -> bool {
        self.state.read().await.registry.is_registered(connection_id)
    }

    /// Get the number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.handles.len()
    }
}

//! Room membership registry.
//!
//! The registry keeps two views that must always agree: rooms by name, and
//! the room each connection belongs to. A room exists only while it has at
//! least one member.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{RelayError, Result};

/// A named set of connections.
#[derive(Debug, Clone)]
pub struct Room {
    name: String,
    members: HashSet<String>,
}

impl Room {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashSet::new(),
        }
    }

    /// Get the room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if a connection is a member.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.contains(connection_id)
    }

    /// Iterate over member connection ids.
    pub fn members(&self) -> impl Iterator<Item = &String> {
        self.members.iter()
    }
}

/// Name and member count of a room at the time of listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    /// Room name.
    pub name: String,
    /// Number of members.
    pub member_count: usize,
}

/// Rooms by name plus the membership index.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    membership: HashMap<String, String>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Fails with `DuplicateConnection` if the connection is a member of any
    /// room; the registry is left unchanged in that case.
    pub fn create_or_join(&mut self, room_name: &str, connection_id: &str) -> Result<&Room> {
        if self.membership.contains_key(connection_id) {
            return Err(RelayError::DuplicateConnection(connection_id.to_string()));
        }

        let room = self
            .rooms
            .entry(room_name.to_string())
            .or_insert_with(|| {
                debug!("Created room {}", room_name);
                Room::new(room_name)
            });
        room.members.insert(connection_id.to_string());
        self.membership
            .insert(connection_id.to_string(), room_name.to_string());
        Ok(room)
    }

    /// Remove a connection from its room, dropping the room once empty.
    ///
    /// Returns the name of the room left, or None if the connection was not
    /// registered.
    pub fn leave(&mut self, connection_id: &str) -> Option<String> {
        let room_name = self.membership.remove(connection_id)?;

        if let Some(room) = self.rooms.get_mut(&room_name) {
            room.members.remove(connection_id);
            if room.members.is_empty() {
                self.rooms.remove(&room_name);
                debug!("Removed empty room {}", room_name);
            }
        }
        Some(room_name)
    }

    /// Snapshot of all rooms, sorted by name.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .values()
            .map(|room| RoomSummary {
                name: room.name.clone(),
                member_count: room.members.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// Room the connection currently belongs to.
    pub fn room_of(&self, connection_id: &str) -> Result<&Room> {
        self.membership
            .get(connection_id)
            .and_then(|name| self.rooms.get(name))
            .ok_or_else(|| RelayError::RoomNotFound(connection_id.to_string()))
    }

    /// Get a room by name.
    pub fn get(&self, room_name: &str) -> Option<&Room> {
        self.rooms.get(room_name)
    }

    /// Check if a connection is registered in any room.
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.membership.contains_key(connection_id)
    }

    /// Get the number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get the number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.membership.len()
    }
}

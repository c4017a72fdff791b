//! Outbound connection handles and the delivery table.
//!
//! Each joined connection owns exactly one [`ConnectionHandle`], stored in the
//! [`DeliveryTable`] for as long as the connection is a room member. Dropping
//! the handle (on unregister) closes the connection's outbound stream.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use super::message::ChatMessage;
use crate::{RelayError, Result};

/// Why a single delivery did not reach its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side is gone; the peer has disconnected.
    HandleGone,
    /// The peer's outbound buffer is full; the message was dropped for it.
    Backpressure,
}

/// Sending half of one connection's outbound stream.
#[derive(Debug)]
pub struct ConnectionHandle {
    sender: mpsc::Sender<ChatMessage>,
}

impl ConnectionHandle {
    /// Create a handle and the outbound stream it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChatMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Try to push a message onto the outbound stream without waiting.
    pub fn deliver(&self, message: ChatMessage) -> std::result::Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => DeliveryError::HandleGone,
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
        })
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Short-lived sending reference used for one delivery pass.
    pub(crate) fn peer(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Token identifying one registration of a connection id.
///
/// Ids can be reused once released, so cleanup that outlives its
/// registration presents this token to avoid removing a newer owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u64);

/// A registered connection: display name plus its outbound handle.
#[derive(Debug)]
struct Registered {
    name: String,
    handle: ConnectionHandle,
    registration: Registration,
}

/// Table of outbound handles indexed by connection id.
#[derive(Debug, Default)]
pub struct DeliveryTable {
    entries: HashMap<String, Registered>,
    next_registration: u64,
}

impl DeliveryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the handle for a connection.
    pub fn register(
        &mut self,
        connection_id: &str,
        name: impl Into<String>,
        handle: ConnectionHandle,
    ) -> Result<Registration> {
        if self.entries.contains_key(connection_id) {
            return Err(RelayError::DuplicateConnection(connection_id.to_string()));
        }
        self.next_registration += 1;
        let registration = Registration(self.next_registration);
        self.entries.insert(
            connection_id.to_string(),
            Registered {
                name: name.into(),
                handle,
                registration,
            },
        );
        Ok(registration)
    }

    /// Current registration token for a connection id.
    pub fn registration_of(&self, connection_id: &str) -> Option<Registration> {
        self.entries.get(connection_id).map(|e| e.registration)
    }

    /// Remove and drop the handle for a connection.
    ///
    /// Returns the display name if the connection was registered.
    pub fn unregister(&mut self, connection_id: &str) -> Option<String> {
        let entry = self.entries.remove(connection_id)?;
        debug!("Released outbound handle for {}", connection_id);
        Some(entry.name)
    }

    /// Deliver one message to one connection.
    pub fn deliver(
        &self,
        connection_id: &str,
        message: ChatMessage,
    ) -> std::result::Result<(), DeliveryError> {
        match self.entries.get(connection_id) {
            Some(entry) => entry.handle.deliver(message),
            None => Err(DeliveryError::HandleGone),
        }
    }

    /// Check if a connection is registered.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// Display name of a registered connection.
    pub fn name_of(&self, connection_id: &str) -> Option<&str> {
        self.entries.get(connection_id).map(|e| e.name.as_str())
    }

    /// Whether the stored handle for a connection has been closed by its peer.
    pub fn is_closed(&self, connection_id: &str) -> bool {
        self.entries
            .get(connection_id)
            .is_some_and(|e| e.handle.is_closed())
    }

    /// Sending references for the given connections, skipping unknown ids.
    pub(crate) fn peers<'a, I>(&self, ids: I) -> Vec<(String, ConnectionHandle)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter_map(|id| {
                self.entries
                    .get(id)
                    .map(|e| (id.clone(), e.handle.peer()))
            })
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

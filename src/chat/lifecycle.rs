//! Per-connection lifecycle: join, leave, and cleanup on disconnect.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::engine::{BroadcastEngine, RouteReport};
use super::handle::{ConnectionHandle, Registration};
use super::message::ChatMessage;
use crate::{RelayError, Result};

/// Lifecycle state of one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet joined.
    Unjoined,
    /// Member of a room with a registered handle.
    Joined,
    /// Cleanup in progress.
    Leaving,
    /// Terminal.
    Gone,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Unjoined
    }
}

/// One connection's membership in the relay.
///
/// Cleanup (unregister, then leave the room) runs at most once, whichever of
/// an explicit leave, stream end, or drop comes first.
pub struct ChatSession {
    engine: Arc<BroadcastEngine>,
    connection_id: String,
    name: String,
    room: Option<String>,
    registration: Option<Registration>,
    state: Mutex<ConnectionState>,
}

impl ChatSession {
    /// Create an unjoined session.
    pub fn new(
        engine: Arc<BroadcastEngine>,
        connection_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            connection_id: connection_id.into(),
            name: name.into(),
            room: None,
            registration: None,
            state: Mutex::new(ConnectionState::Unjoined),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.lock_state();
        debug!(
            "Session {} state changed: {:?} -> {:?}",
            self.connection_id, *state, next
        );
        *state = next;
    }

    /// Get the connection id.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Get the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Room joined by this session, if any.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    /// Join a room and return the session's outbound stream.
    ///
    /// Any failure (invalid room name, duplicate connection id) moves the
    /// session straight to `Gone`.
    pub async fn join(&mut self, room_name: &str) -> Result<mpsc::Receiver<ChatMessage>> {
        if self.state() != ConnectionState::Unjoined {
            return Err(RelayError::Validation(format!(
                "session {} cannot join from state {:?}",
                self.connection_id,
                self.state()
            )));
        }

        let result = self.try_join(room_name).await;
        match result {
            Ok((receiver, registration)) => {
                self.room = Some(room_name.to_string());
                self.registration = Some(registration);
                self.set_state(ConnectionState::Joined);
                self.engine.announce_join(&self.connection_id).await;
                Ok(receiver)
            }
            Err(e) => {
                warn!("Join rejected for {}: {}", self.connection_id, e);
                self.set_state(ConnectionState::Gone);
                Err(e)
            }
        }
    }

    async fn try_join(
        &self,
        room_name: &str,
    ) -> Result<(mpsc::Receiver<ChatMessage>, Registration)> {
        let config = self.engine.config();
        validate_room_name(room_name, config.max_room_name_length)?;

        let (handle, receiver) = ConnectionHandle::channel(config.outbound_buffer);
        let registration = self
            .engine
            .hub()
            .join(room_name, &self.connection_id, &self.name, handle)
            .await?;
        Ok((receiver, registration))
    }

    /// Send text to the other members of the room.
    pub async fn send(&self, text: &str) -> Result<RouteReport> {
        if self.state() != ConnectionState::Joined {
            return Err(RelayError::NotJoined);
        }
        self.engine.route(&self.connection_id, text).await
    }

    /// Leave the room and release the outbound handle.
    ///
    /// Returns true if this call performed the cleanup. If the handle was
    /// already evicted after a delivery failure, the hub is left untouched,
    /// since the id may have been taken by another connection since.
    pub async fn leave(&self) -> bool {
        {
            let mut state = self.lock_state();
            match *state {
                ConnectionState::Joined => *state = ConnectionState::Leaving,
                ConnectionState::Unjoined => {
                    *state = ConnectionState::Gone;
                    return false;
                }
                ConnectionState::Leaving | ConnectionState::Gone => return false,
            }
        }

        if let Some(registration) = self.registration {
            self.engine
                .disconnect(&self.connection_id, registration)
                .await;
        }
        self.set_state(ConnectionState::Gone);
        true
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !matches!(state, ConnectionState::Joined | ConnectionState::Leaving) {
            return;
        }
        let Some(registration) = self.registration else {
            return;
        };

        // The owning task ended without leaving (cancelled or aborted).
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let engine = Arc::clone(&self.engine);
                let connection_id = std::mem::take(&mut self.connection_id);
                debug!("Session {} dropped while joined, cleaning up", connection_id);
                runtime.spawn(async move {
                    engine.disconnect(&connection_id, registration).await;
                });
            }
            Err(_) => warn!(
                "Session {} dropped outside a runtime; registry entry left behind",
                self.connection_id
            ),
        }
    }
}

/// Check a room name against the configured rules.
pub fn validate_room_name(room_name: &str, max_len: usize) -> Result<()> {
    if room_name.trim().is_empty() {
        return Err(RelayError::InvalidRoomName(
            "room name must not be empty".to_string(),
        ));
    }
    if room_name.chars().count() > max_len {
        return Err(RelayError::InvalidRoomName(format!(
            "room name must be at most {max_len} characters"
        )));
    }
    if room_name.chars().any(char::is_control) {
        return Err(RelayError::InvalidRoomName(
            "room name must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::hub::ChatHub;
    use crate::config::ChatConfig;
    use std::time::Duration;

    fn engine() -> Arc<BroadcastEngine> {
        Arc::new(BroadcastEngine::new(
            Arc::new(ChatHub::new()),
            ChatConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_join_transitions_to_joined() {
        let engine = engine();
        let mut session = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        assert_eq!(session.state(), ConnectionState::Unjoined);

        let _rx = session.join("lobby").await.unwrap();
        assert_eq!(session.state(), ConnectionState::Joined);
        assert_eq!(session.room(), Some("lobby"));
        assert_eq!(engine.hub().room_of("a").await.unwrap(), "lobby");
    }

    #[tokio::test]
    async fn test_duplicate_join_goes_to_gone() {
        let engine = engine();
        let mut first = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        let _rx = first.join("lobby").await.unwrap();

        let mut second = ChatSession::new(Arc::clone(&engine), "a", "Impostor");
        let err = second.join("den").await.unwrap_err();
        assert!(matches!(err, RelayError::DuplicateConnection(_)));
        assert_eq!(second.state(), ConnectionState::Gone);

        // Dropping the rejected session must not disturb the original.
        drop(second);
        tokio::task::yield_now().await;
        assert_eq!(engine.hub().room_of("a").await.unwrap(), "lobby");
        assert_eq!(engine.hub().list_rooms().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_room_name_rejected() {
        let engine = engine();
        let mut session = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        let err = session.join("").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidRoomName(_)));
        assert_eq!(session.state(), ConnectionState::Gone);
        assert!(engine.hub().list_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_twice_rejected() {
        let engine = engine();
        let mut session = ChatSession::new(engine, "a", "Alice");
        let _rx = session.join("lobby").await.unwrap();
        assert!(matches!(
            session.join("den").await,
            Err(RelayError::Validation(_))
        ));
        assert_eq!(session.state(), ConnectionState::Joined);
    }

    #[tokio::test]
    async fn test_leave_runs_cleanup_once() {
        let engine = engine();
        let mut session = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        let mut rx = session.join("lobby").await.unwrap();

        assert!(session.leave().await);
        assert!(!session.leave().await);
        assert_eq!(session.state(), ConnectionState::Gone);
        assert!(engine.hub().list_rooms().await.is_empty());
        // Outbound stream ends once the handle is released.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_requires_joined() {
        let engine = engine();
        let mut session = ChatSession::new(engine, "a", "Alice");
        assert!(matches!(
            session.send("hi").await,
            Err(RelayError::NotJoined)
        ));

        let _rx = session.join("lobby").await.unwrap();
        session.leave().await;
        assert!(matches!(
            session.send("hi").await,
            Err(RelayError::NotJoined)
        ));
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let engine = engine();
        let mut alice = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        let mut bob = ChatSession::new(Arc::clone(&engine), "b", "Bob");
        let mut rx_a = alice.join("lobby").await.unwrap();
        let mut rx_b = bob.join("lobby").await.unwrap();

        alice.send("hi").await.unwrap();
        let msg = rx_b.recv().await.unwrap();
        assert_eq!(msg.sender_name, "Alice");
        assert_eq!(msg.text, "hi");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_while_joined_cleans_up() {
        let engine = engine();
        let mut session = ChatSession::new(Arc::clone(&engine), "a", "Alice");
        let _rx = session.join("lobby").await.unwrap();
        drop(session);

        tokio::time::timeout(Duration::from_secs(1), async {
            while engine.hub().is_registered("a").await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(engine.hub().list_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_after_eviction_spares_reused_id() {
        let engine = engine();
        let mut alice = ChatSession::new(Arc::clone(&engine), "x", "Alice");
        let mut bob = ChatSession::new(Arc::clone(&engine), "b", "Bob");
        let rx_alice = alice.join("lobby").await.unwrap();
        let _rx_bob = bob.join("lobby").await.unwrap();

        drop(rx_alice);
        let report = bob.send("hello").await.unwrap();
        assert_eq!(report.gone, vec!["x".to_string()]);

        let mut carol = ChatSession::new(Arc::clone(&engine), "x", "Carol");
        let _rx_carol = carol.join("den").await.unwrap();
        assert!(engine.hub().is_registered("x").await);

        alice.leave().await;
        assert_eq!(alice.state(), ConnectionState::Gone);
        assert!(engine.hub().is_registered("x").await);
        assert_eq!(engine.hub().room_of("x").await.unwrap(), "den");
        assert_eq!(carol.state(), ConnectionState::Joined);

        let mut rooms: Vec<_> = engine
            .hub()
            .list_rooms()
            .await
            .into_iter()
            .map(|r| (r.name, r.member_count))
            .collect();
        rooms.sort();
        assert_eq!(
            rooms,
            vec![("den".to_string(), 1), ("lobby".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_drop_after_eviction_spares_reused_id() {
        let engine = engine();
        let mut alice = ChatSession::new(Arc::clone(&engine), "x", "Alice");
        let mut bob = ChatSession::new(Arc::clone(&engine), "b", "Bob");
        let rx_alice = alice.join("lobby").await.unwrap();
        let _rx_bob = bob.join("lobby").await.unwrap();
        drop(rx_alice);
        bob.send("hello").await.unwrap();

        let mut carol = ChatSession::new(Arc::clone(&engine), "x", "Carol");
        let _rx_carol = carol.join("den").await.unwrap();

        drop(alice);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.hub().room_of("x").await.unwrap(), "den");
    }

    #[tokio::test]
    async fn test_leave_unjoined_is_noop() {
        let engine = engine();
        let session = ChatSession::new(engine, "a", "Alice");
        assert!(!session.leave().await);
        assert_eq!(session.state(), ConnectionState::Gone);
    }

    #[test]
    fn test_validate_room_name() {
        assert!(validate_room_name("lobby", 64).is_ok());
        assert!(validate_room_name("   ", 64).is_err());
        assert!(validate_room_name("abcdef", 5).is_err());
        assert!(validate_room_name("bad\nname", 64).is_err());
    }
}

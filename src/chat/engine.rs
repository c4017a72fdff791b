//! Message fan-out to the members of a room.

use std::sync::Arc;

use tracing::{debug, warn};

use super::handle::{ConnectionHandle, DeliveryError, Registration};
use super::hub::{ChatHub, Departure};
use super::message::ChatMessage;
use crate::config::ChatConfig;
use crate::{RelayError, Result};

/// Outcome of routing one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteReport {
    /// Peers the message was queued for.
    pub delivered: usize,
    /// Peers skipped because their outbound buffer was full.
    pub dropped: usize,
    /// Peers whose handle was gone; they have been evicted.
    pub gone: Vec<String>,
}

/// Routes messages from a sender to the other members of its room.
pub struct BroadcastEngine {
    hub: Arc<ChatHub>,
    config: ChatConfig,
}

impl BroadcastEngine {
    /// Create an engine over a shared hub.
    pub fn new(hub: Arc<ChatHub>, config: ChatConfig) -> Self {
        Self { hub, config }
    }

    /// Get the shared hub.
    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }

    /// Get the chat configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Route a message from `sender_id` to every other member of its room.
    ///
    /// A sender that is no longer in a room is not an error; the message is
    /// dropped. Blank text is ignored and over-long text is rejected.
    pub async fn route(&self, sender_id: &str, text: &str) -> Result<RouteReport> {
        if text.trim().is_empty() {
            return Ok(RouteReport::default());
        }
        let len = text.chars().count();
        if len > self.config.max_message_length {
            return Err(RelayError::MessageTooLong {
                len,
                max: self.config.max_message_length,
            });
        }

        let snapshot = match self.hub.peers_of(sender_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Dropping message from {}: {}", sender_id, e);
                return Ok(RouteReport::default());
            }
        };

        let message = ChatMessage::new(sender_id, snapshot.name, text);
        debug!(
            "Routing message from {} to {} peer(s) in {}",
            sender_id,
            snapshot.peers.len(),
            snapshot.room
        );

        let report = Self::fan_out(&snapshot.peers, &message);
        self.evict(report.gone.clone()).await;
        Ok(report)
    }

    /// Tell the rest of the room that a connection joined.
    pub async fn announce_join(&self, connection_id: &str) {
        if !self.config.announce_membership {
            return;
        }
        if let Ok(snapshot) = self.hub.peers_of(connection_id).await {
            let notice = ChatMessage::join(connection_id, snapshot.name);
            let report = Self::fan_out(&snapshot.peers, &notice);
            self.evict(report.gone).await;
        }
    }

    /// Remove a connection from the relay and tell the rest of its room.
    ///
    /// Safe to call more than once; only the first call for a registration
    /// has any effect, and a registration already evicted is left alone.
    pub async fn disconnect(
        &self,
        connection_id: &str,
        registration: Registration,
    ) -> Option<Departure> {
        let departure = self.hub.leave(connection_id, registration).await?;
        let gone = self.announce_leave(&departure).await;
        self.evict(gone).await;
        Some(departure)
    }

    /// Send a leave notice and return the peers found gone while doing so.
    async fn announce_leave(&self, departure: &Departure) -> Vec<String> {
        if !self.config.announce_membership {
            return Vec::new();
        }
        let peers = self
            .hub
            .members_of(&departure.room, &departure.connection_id)
            .await;
        let notice = ChatMessage::leave(&departure.connection_id, &departure.name);
        Self::fan_out(&peers, &notice).gone
    }

    /// Deliver to each peer independently; one failure never stops the rest.
    fn fan_out(peers: &[(String, ConnectionHandle)], message: &ChatMessage) -> RouteReport {
        let mut report = RouteReport::default();
        for (peer_id, handle) in peers {
            match handle.deliver(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Backpressure) => {
                    warn!("Outbound buffer full for {}, message dropped", peer_id);
                    report.dropped += 1;
                }
                Err(DeliveryError::HandleGone) => {
                    debug!("Handle gone for {}", peer_id);
                    report.gone.push(peer_id.clone());
                }
            }
        }
        report
    }

    /// Evict gone peers, then any peers found gone while announcing those
    /// departures, until nothing is left.
    async fn evict(&self, mut pending: Vec<String>) {
        while !pending.is_empty() {
            let departures = self.hub.evict_closed(&pending).await;
            pending = Vec::new();
            for departure in departures {
                debug!(
                    "Evicted {} from {} after delivery failure",
                    departure.connection_id, departure.room
                );
                pending.extend(self.announce_leave(&departure).await);
            }
        }
    }
}

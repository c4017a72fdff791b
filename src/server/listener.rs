//! TCP listener for the chat relay.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::connection::handle_connection;
use crate::chat::BroadcastEngine;
use crate::config::ServerConfig;
use crate::{RelayError, Result};

/// Accepts TCP clients, each served on its own task.
///
/// At most `max_connections` clients are served at once; further clients
/// wait in the listen backlog until a slot frees up.
pub struct ChatServer {
    listener: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl ChatServer {
    /// Bind the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Chat server listening on {} (max {} connections)",
            listener.local_addr()?,
            config.max_connections
        );

        Ok(Self {
            listener,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn in_use(&self) -> usize {
        self.max_connections - self.slots.available_permits()
    }

    /// Accept clients until the slot pool is closed.
    ///
    /// A failed accept is logged and the loop continues.
    pub async fn run(self, engine: Arc<BroadcastEngine>) -> Result<()> {
        loop {
            let slot = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|_| RelayError::Io(std::io::Error::other("connection slots closed")))?;

            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            debug!(
                "Accepted {} ({}/{} connections)",
                addr,
                self.in_use(),
                self.max_connections
            );

            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                handle_connection(stream, addr, engine).await;
                drop(slot);
            });
        }
    }
}

//! WebSocket endpoint.
//!
//! Serves the chat protocol over WebSocket at `/ws` and a read-only room
//! listing at `/rooms`.

pub mod ws;

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::chat::BroadcastEngine;
use crate::config::WebConfig;
use crate::server::RoomInfo;
use crate::Result;

pub use ws::chat_ws_handler;

/// Build the router for the WebSocket endpoint.
pub fn create_router(engine: Arc<BroadcastEngine>) -> Router {
    Router::new()
        .route("/ws", get(chat_ws_handler))
        .route("/rooms", get(list_rooms))
        .with_state(engine)
}

/// GET /rooms
async fn list_rooms(State(engine): State<Arc<BroadcastEngine>>) -> Json<Vec<RoomInfo>> {
    let rooms = engine.hub().list_rooms().await;
    Json(rooms.into_iter().map(RoomInfo::from).collect())
}

/// Bind the configured address and serve until the listener fails.
pub async fn serve(config: &WebConfig, engine: Arc<BroadcastEngine>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(engine)).await?;
    Ok(())
}

//! WebSocket chat handler.
//!
//! Each text frame carries one JSON message in the same format as a TCP line.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::chat::BroadcastEngine;
use crate::server::{ClientConnection, ServerMessage};

/// WebSocket chat handler.
///
/// GET /ws
///
/// Messages above the frame limit fail the socket, which ends the session.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<BroadcastEngine>>,
) -> Response {
    let max_frame = engine.config().max_frame_length();
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, engine))
}

/// Serve one WebSocket client until the socket closes.
async fn handle_socket(socket: WebSocket, engine: Arc<BroadcastEngine>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (outbound, replies) = mpsc::channel(engine.config().outbound_buffer);
    let writer_task = tokio::spawn(write_loop(ws_sender, replies));

    tracing::debug!("WebSocket session started");
    let mut client = ClientConnection::new(engine, outbound);
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => client.handle_text(&text).await,
            Ok(Message::Close(_)) => {
                tracing::debug!("WebSocket closed by client");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("WebSocket error: {}", e);
                break;
            }
        }
    }

    client.close().await;
    let _ = writer_task.await;
    tracing::debug!("WebSocket session ended");
}

async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut replies: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = replies.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode server message: {}", e);
                continue;
            }
        };
        if ws_sender.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
    let _ = ws_sender.close().await;
}

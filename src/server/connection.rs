//! Newline-delimited JSON over TCP.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use super::client::ClientConnection;
use super::protocol::ServerMessage;
use crate::chat::BroadcastEngine;
use crate::{RelayError, Result};

/// Serve one TCP client until its stream ends.
///
/// The inbound loop reads requests line by line while a separate writer task
/// drains replies and chat traffic to the socket. Read errors are treated the
/// same as end of stream; cleanup runs before this function returns. A line
/// longer than the frame limit is answered with `message_too_long` and the
/// connection is closed.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, engine: Arc<BroadcastEngine>) {
    info!("Client connected: {}", peer);
    let max_frame = engine.config().max_frame_length();
    let (reader, writer) = stream.into_split();
    let (outbound, replies) = mpsc::channel(engine.config().outbound_buffer);
    let writer_task = tokio::spawn(write_loop(writer, replies));

    let mut client = ClientConnection::new(engine, outbound);
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_frame));
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => client.handle_text(&line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Line from {} exceeds {} bytes, closing", peer, max_frame);
                client
                    .reject(&RelayError::FrameTooLong { max: max_frame })
                    .await;
                break;
            }
            Err(LinesCodecError::Io(e)) => {
                debug!("Read error from {}: {}", peer, e);
                break;
            }
        }
    }

    client.close().await;
    let _ = writer_task.await;
    info!("Client disconnected: {}", peer);
}

/// Write each message as one JSON line until all senders are gone or the
/// socket fails.
async fn write_loop(mut writer: OwnedWriteHalf, mut replies: mpsc::Receiver<ServerMessage>) {
    while let Some(msg) = replies.recv().await {
        if let Err(e) = write_message(&mut writer, &msg).await {
            debug!("Write failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_message(writer: &mut OwnedWriteHalf, msg: &ServerMessage) -> Result<()> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

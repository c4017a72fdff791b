//! Test helpers for integration tests.
//!
//! Provides TestServer and TestClient for driving the relay over real TCP
//! sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use chatrelay::config::{ChatConfig, ServerConfig};
use chatrelay::{BroadcastEngine, ChatHub, ChatServer};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing was delivered.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// A relay listening on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub engine: Arc<BroadcastEngine>,
}

impl TestServer {
    /// Start a server with default chat settings.
    pub async fn start() -> Self {
        Self::start_with(ChatConfig::default()).await
    }

    /// Start a server with the given chat settings.
    pub async fn start_with(chat: ChatConfig) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 64,
        };
        let server = ChatServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let engine = Arc::new(BroadcastEngine::new(Arc::new(ChatHub::new()), chat));

        let run_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let _ = server.run(run_engine).await;
        });

        Self { addr, engine }
    }

    /// Connect a new client.
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await.unwrap()
    }

    /// Wait until a connection id is no longer registered.
    pub async fn wait_unregistered(&self, connection_id: &str) {
        timeout(DEFAULT_TIMEOUT, async {
            while self.engine.hub().is_registered(connection_id).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection was never cleaned up");
    }
}

/// Line-oriented JSON client.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Send one JSON message.
    pub async fn send(&mut self, msg: Value) {
        let mut line = msg.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    /// Send a raw line.
    pub async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Send raw bytes with no line terminator.
    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        match timeout(DEFAULT_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(None)) | Ok(Err(_)) => {}
            Ok(Ok(Some(line))) => panic!("expected close, got {line}"),
            Err(_) => panic!("timed out waiting for the server to close"),
        }
    }

    /// Receive the next message, failing the test on timeout or EOF.
    pub async fn recv(&mut self) -> Value {
        let line = timeout(DEFAULT_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for server message")
            .unwrap()
            .expect("server closed the connection");
        serde_json::from_str(&line).unwrap()
    }

    /// Receive a message if one arrives within the quiet period.
    pub async fn try_recv(&mut self) -> Option<Value> {
        match timeout(QUIET_PERIOD, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Some(serde_json::from_str(&line).unwrap()),
            _ => None,
        }
    }

    /// Join a room with an explicit connection id and wait for the reply.
    pub async fn join(&mut self, room: &str, name: &str, connection_id: &str) -> Value {
        self.send(json!({
            "type": "join",
            "room": room,
            "name": name,
            "connection_id": connection_id,
        }))
        .await;
        self.recv().await
    }

    /// Send chat text.
    pub async fn say(&mut self, text: &str) {
        self.send(json!({"type": "send", "text": text})).await;
    }

    /// Request the room list and return its `rooms` array.
    pub async fn list(&mut self) -> Vec<Value> {
        self.send(json!({"type": "list"})).await;
        let reply = self.recv().await;
        assert_eq!(reply["type"], "room_list");
        reply["rooms"].as_array().cloned().unwrap_or_default()
    }

    /// Close the write side, signalling end of stream to the server.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

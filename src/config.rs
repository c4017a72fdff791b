//! Configuration module for the chat relay.

use serde::Deserialize;
use std::path::Path;

use crate::{RelayError, Result};

/// TCP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_max_connections() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// WebSocket endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Enable the WebSocket endpoint.
    #[serde(default)]
    pub enabled: bool,
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_web_port(),
        }
    }
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Room joined by clients that do not name one.
    #[serde(default = "default_room")]
    pub default_room: String,
    /// Maximum message length in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Maximum room name length in characters.
    #[serde(default = "default_max_room_name_length")]
    pub max_room_name_length: usize,
    /// Capacity of each connection's outbound channel.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Route join/leave notices to the other members of a room.
    #[serde(default)]
    pub announce_membership: bool,
}

/// Bytes allowed in a frame on top of the escaped message text.
const FRAME_OVERHEAD: usize = 1024;

impl ChatConfig {
    /// Largest inbound frame (a TCP line or WebSocket message) in bytes.
    ///
    /// Covers a maximal message with every character JSON-escaped
    /// (`\uXXXX`, six bytes) plus the request envelope.
    pub fn max_frame_length(&self) -> usize {
        self.max_message_length
            .saturating_mul(6)
            .saturating_add(FRAME_OVERHEAD)
    }
}

fn default_room() -> String {
    "lobby".to_string()
}

fn default_max_message_length() -> usize {
    2000
}

fn default_max_room_name_length() -> usize {
    64
}

fn default_outbound_buffer() -> usize {
    64
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_room: default_room(),
            max_message_length: default_max_message_length(),
            max_room_name_length: default_max_room_name_length(),
            outbound_buffer: default_outbound_buffer(),
            announce_membership: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/chatrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// TCP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket endpoint configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Chat configuration.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CHATRELAY_PORT`: TCP listen port
    /// - `CHATRELAY_LOG_LEVEL`: log level
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("CHATRELAY_PORT") {
            if !port.is_empty() {
                self.server.port = port
                    .parse()
                    .map_err(|_| RelayError::Config(format!("invalid CHATRELAY_PORT: {port}")))?;
            }
        }
        if let Ok(level) = std::env::var("CHATRELAY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(RelayError::Config(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.chat.outbound_buffer == 0 {
            return Err(RelayError::Config(
                "chat.outbound_buffer must be greater than 0".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(RelayError::Config(
                "chat.max_message_length must be greater than 0".to_string(),
            ));
        }
        let room_len = self.chat.default_room.chars().count();
        if self.chat.default_room.trim().is_empty() || room_len > self.chat.max_room_name_length {
            return Err(RelayError::Config(format!(
                "chat.default_room must be 1-{} characters",
                self.chat.max_room_name_length
            )));
        }
        Ok(())
    }
}

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ServerError;

/// Runtime settings for a [`Server`](crate::server::Server).
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```yaml
/// port: 9000
/// max_connections: 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. The listener always uses address reuse.
    pub host: String,
    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Upper bound on concurrently served connections. `0` means unbounded.
    pub max_connections: usize,
    /// Deadline for receiving a complete request head. `0` disables it.
    pub read_timeout_secs: u64,
    /// Largest request head (request line plus headers) accepted.
    pub max_head_bytes: usize,
    /// Largest request body accepted via `Content-Length`.
    pub max_body_bytes: usize,
    /// Largest single WebSocket frame payload accepted from a peer.
    pub max_frame_bytes: usize,
    /// Frames a WebSocket may have queued for its writer before
    /// `send_string` starts failing. Values below 1 are treated as 1.
    pub websocket_queue_frames: usize,
    /// Send a Going-Away close frame to every live WebSocket on halt.
    pub close_websockets_on_halt: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 0,
            read_timeout_secs: 30,
            max_head_bytes: 16 * 1024,
            max_body_bytes: 1024 * 1024,
            max_frame_bytes: 16 * 1024 * 1024,
            websocket_queue_frames: 1024,
            close_websockets_on_halt: true,
        }
    }
}

impl ServerConfig {
    /// Default settings listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Parses a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(yaml).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Reads and parses a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Builds the configuration from the environment.
    ///
    /// `SWITCHYARD_CONFIG` names an optional YAML file; `SWITCHYARD_HOST` and
    /// `SWITCHYARD_PORT` override whatever the file (or the defaults) say.
    pub fn load() -> Result<Self, ServerError> {
        let mut cfg = match std::env::var("SWITCHYARD_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("SWITCHYARD_HOST") {
            cfg.host = host;
        }

        if let Ok(port) = std::env::var("SWITCHYARD_PORT") {
            cfg.port = port
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid SWITCHYARD_PORT: {port}")))?;
        }

        Ok(cfg)
    }

    /// `host:port` string handed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

//! Error types.
//!
//! Only [`ServerError`] ever reaches the host. Everything else is scoped to a
//! single connection: it is logged and the connection is closed.

use std::io;

/// Errors surfaced by server lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be opened on the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// `start` was called while the server was already accepting connections.
    #[error("server is already listening")]
    AlreadyListening,

    /// The configuration could not be read or was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures while turning raw bytes into a [`Request`](crate::http::request::Request).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// More bytes are needed before a decision can be made.
    #[error("incomplete request")]
    Incomplete,
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unsupported request method")]
    InvalidMethod,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

/// Failures on an upgraded connection.
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    /// The upgrade request was missing something the handshake needs.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The peer sent a frame that violates the framing rules.
    #[error("websocket protocol error: {0}")]
    Protocol(String),

    /// A text message carried bytes that are not UTF-8.
    #[error("invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// The declared payload length exceeds the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: u64, limit: usize },

    /// The peer is not draining its outbound queue fast enough.
    #[error("websocket outbound queue is full ({capacity} frames)")]
    QueueFull { capacity: usize },

    /// The socket has already left the Open state.
    #[error("websocket connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

//! Switchyard - an embeddable HTTP/1.1 and WebSocket server.
//!
//! The host registers routes, then starts and halts the server; every
//! accepted connection runs as its own task and `halt` waits for all of them.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{ParseError, ServerError, WebSocketError};
pub use http::request::{Method, Request};
pub use http::response::{Response, StatusCode};
pub use server::{Server, ServerStatus};
pub use websocket::WebSocket;

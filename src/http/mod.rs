//! HTTP/1.1 request handling.
//!
//! - **`connection`**: per-connection state machine (read, route, write or upgrade)
//! - **`parser`**: parses a request head and body from a byte buffer
//! - **`request`**: immutable request view with case-insensitive headers
//! - **`response`**: mutable response builder filled in by handlers
//! - **`writer`**: serializes and writes responses
//! - **`handler`**: a registered (method, path, callback) route
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for a complete request head
//!        └──────┬──────┘
//!               │ Request parsed
//!               ▼
//!        ┌──────────────────┐
//!        │     Routing      │ ← Upgrade route? else first matching handler, else 404
//!        └──────┬───────────┘
//!               ├─ Upgrade → 101, WebSocket read loop takes the socket
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               └─ Close
//! ```
//!
//! There is no keep-alive: every connection serves exactly one request.

pub mod connection;
pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

//! WebSocket support (RFC 6455).
//!
//! - **`handshake`**: accept-key computation and the 101 reply
//! - **`frame`**: base framing codec
//! - **`socket`**: one upgraded connection, its callbacks and read loop
//! - **`registry`**: the set of live sockets kept by the server
//!
//! ```ignore
//! server.on_websocket_connection("/chat", |_req, ws| {
//!     ws.on_message(|ws, msg| {
//!         let _ = ws.send_string(msg);
//!     });
//! });
//! ```

pub mod frame;
pub mod handshake;
pub mod registry;
pub mod socket;

pub use frame::{Frame, Opcode, close_code};
pub use registry::SocketRegistry;
pub use socket::{WebSocket, WebSocketState};

//! Server side of the opening handshake (RFC 6455 section 4.2).

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::WebSocketError;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};

/// The WebSocket magic GUID used in the handshake.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the Sec-WebSocket-Accept value from the client's key.
///
/// ```
/// # use switchyard::websocket::handshake::compute_accept_key;
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Builds the 101 Switching Protocols reply for an upgrade request.
///
/// Fails when `Sec-WebSocket-Key` is absent or blank.
pub fn accept_response(request: &Request) -> Result<Response, WebSocketError> {
    let key = request
        .header("Sec-WebSocket-Key")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| WebSocketError::Handshake("missing Sec-WebSocket-Key header".into()))?;

    let mut response = Response::new();
    response
        .status(StatusCode::SWITCHING_PROTOCOLS.as_u16())
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", compute_accept_key(key));

    Ok(response)
}

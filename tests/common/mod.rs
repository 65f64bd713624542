//! Shared helpers for the socket-level tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use switchyard::websocket::frame::{Frame, Opcode, decode_frame, encode_frame};
use switchyard::{Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const MASK: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
pub const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

pub fn local_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout_secs: 5,
        ..ServerConfig::default()
    }
}

/// Builds a server on an ephemeral loopback port, lets `setup` register
/// routes, and starts it without blocking.
pub async fn start_server(setup: impl FnOnce(&mut Server)) -> (Arc<Server>, SocketAddr) {
    start_server_with(local_config(), setup).await
}

pub async fn start_server_with(
    config: ServerConfig,
    setup: impl FnOnce(&mut Server),
) -> (Arc<Server>, SocketAddr) {
    let mut server = Server::with_config(config);
    setup(&mut server);
    server.start(false).await.expect("server should start");
    let addr = server.local_addr().expect("bound address");
    (Arc::new(server), addr)
}

/// Sends raw bytes and reads until the server closes the connection.
pub async fn send_raw(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

pub async fn request(addr: SocketAddr, method: &str, path: &str) -> String {
    let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    send_raw(addr, raw.as_bytes()).await
}

pub fn status_of(response: &str) -> u16 {
    response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("no status line in {response:?}"))
}

pub fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub fn upgrade_request(path: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {KEY}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// Minimal client side of a WebSocket for driving the server.
pub struct WsClient {
    pub stream: TcpStream,
    buf: BytesMut,
}

impl WsClient {
    /// Performs the opening handshake and returns the client plus the raw
    /// response head.
    pub async fn connect(addr: SocketAddr, path: &str) -> (Self, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(upgrade_request(path).as_bytes())
            .await
            .unwrap();
        Self::read_handshake(stream).await
    }

    /// Reads the server's reply to an upgrade request already written to
    /// `stream`.
    pub async fn read_handshake(mut stream: TcpStream) -> (Self, String) {
        let mut buf = BytesMut::new();
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert!(n > 0, "server closed during handshake");
        };
        let head = String::from_utf8_lossy(&buf.split_to(head_end)).into_owned();

        (Self { stream, buf }, head)
    }

    pub async fn send_frame(&mut self, frame: &Frame) {
        self.stream
            .write_all(&encode_frame(frame, Some(MASK)))
            .await
            .unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_frame(&Frame::text(text)).await;
    }

    /// Next frame from the server, or `None` once the server closed the
    /// socket.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some((frame, used)) = decode_frame(&self.buf, false, usize::MAX).unwrap() {
                let _ = self.buf.split_to(used);
                return Some(frame);
            }
            let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn recv_text(&mut self) -> String {
        let frame = self.recv_frame().await.expect("connection closed");
        assert_eq!(frame.opcode, Opcode::Text);
        String::from_utf8(frame.payload).unwrap()
    }
}

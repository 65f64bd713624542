use std::fmt;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, warn};

use crate::error::ParseError;
use crate::http::parser::parse_http_request_with_limits;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::ServeContext;
use crate::server::router::WebSocketRoute;
use crate::websocket::{WebSocket, close_code, handshake};

/// Identifies one accepted TCP connection for its whole life, including after
/// a WebSocket upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        ConnectionId(raw)
    }

    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ConnectionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    buffer: BytesMut,
    state: ConnectionState,
    ctx: Arc<ServeContext>,
    permit: Option<OwnedSemaphorePermit>,
}

/// One request, one response, then close; or hand-off to a WebSocket.
///
/// ```text
/// Reading ─▶ Routing ─┬─▶ Writing ─▶ Closed
///                     └─▶ Upgrading ─▶ (WebSocket read loop)
/// ```
pub enum ConnectionState {
    Reading,
    Routing(Request),
    Upgrading(Request, WebSocketRoute),
    Writing(ResponseWriter),
    Closed,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        ctx: Arc<ServeContext>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Reading,
            ctx,
            permit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Some(req) => ConnectionState::Routing(req),
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Routing(req) => {
                    debug!(
                        conn = %self.id,
                        method = %req.method(),
                        path = %req.path(),
                        "request received"
                    );

                    if req.is_websocket_upgrade() {
                        if let Some(route) = self.ctx.router.find_websocket_route(req.path()) {
                            self.state = ConnectionState::Upgrading(req, route.clone());
                            continue;
                        }
                    }

                    let method = req.method();
                    let path = req.path().to_string();
                    let response = self.dispatch(req).await;

                    info!(
                        conn = %self.id,
                        peer = %self.peer,
                        %method,
                        %path,
                        status = response.status_code().as_u16(),
                        "request handled"
                    );

                    self.state = ConnectionState::Writing(ResponseWriter::new(response));
                }

                ConnectionState::Upgrading(req, route) => {
                    return self.upgrade(req, route).await;
                }

                ConnectionState::Writing(mut writer) => {
                    writer.write_to_stream(&mut self.stream).await?;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        let _ = self.stream.shutdown().await;
        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<Option<Request>> {
        match self.ctx.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_request_inner())
                .await
                .map_err(|_| anyhow!("timed out after {:?} waiting for request head", limit))?,
            None => self.read_request_inner().await,
        }
    }

    async fn read_request_inner(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request_with_limits(&self.buffer, self.ctx.limits) {
                Ok((request, consumed)) => {
                    // Anything after the request stays buffered; after an
                    // upgrade those bytes are the first frames.
                    self.buffer.advance(consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => {
                    return Err(anyhow!("HTTP parse error: {e}"));
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                if !self.buffer.is_empty() {
                    debug!(conn = %self.id, buffered = self.buffer.len(), "peer closed mid-request");
                }
                return Ok(None);
            }
        }
    }

    /// Runs the first matching handler, or produces a 404.
    ///
    /// The handler runs on the blocking pool: it may block freely, and a
    /// panic surfaces as a join error instead of tearing down the task.
    async fn dispatch(&self, request: Request) -> Response {
        let Some(handler) = self.ctx.router.find_handler(&request).cloned() else {
            debug!(conn = %self.id, path = %request.path(), "no route matched");
            return Response::not_found();
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let mut response = Response::new();
            let result = handler.execute(&request, &mut response);
            (response, result)
        })
        .await;

        match outcome {
            Ok((response, Ok(()))) => response,
            Ok((_, Err(e))) => {
                error!(conn = %self.id, error = %e, "handler failed");
                Response::internal_error()
            }
            Err(e) => {
                error!(conn = %self.id, error = %e, "handler panicked");
                Response::internal_error()
            }
        }
    }

    async fn upgrade(self, request: Request, route: WebSocketRoute) -> anyhow::Result<()> {
        let Connection {
            id,
            peer,
            mut stream,
            buffer,
            ctx,
            permit,
            ..
        } = self;

        if ctx.state.registry.represents(id) {
            warn!(conn = %id, "connection already upgraded, ignoring handshake");
            return Ok(());
        }

        let response = match handshake::accept_response(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(conn = %id, peer = %peer, error = %e, "websocket handshake rejected");
                ResponseWriter::new(Response::bad_request(&e.to_string()))
                    .write_to_stream(&mut stream)
                    .await?;
                let _ = stream.shutdown().await;
                return Ok(());
            }
        };

        let (reader, mut writer) = stream.into_split();
        ResponseWriter::new(response)
            .write_to_stream(&mut writer)
            .await?;

        let socket = WebSocket::new(id, Some(peer));
        if !ctx.state.registry.insert(socket.clone()) {
            warn!(conn = %id, "websocket already registered");
            return Ok(());
        }
        socket.open(writer, ctx.websocket_queue_frames, &ctx.state.tracker);

        info!(conn = %id, peer = %peer, path = %request.path(), "websocket connected");

        // Halt may already have swept the live set before this insert.
        if ctx.close_websockets_on_halt && !ctx.state.listening.load(Ordering::SeqCst) {
            debug!(conn = %id, "upgraded during halt, closing");
            socket.close(close_code::GOING_AWAY, "server shutting down");
        }

        if catch_unwind(AssertUnwindSafe(|| route.connected(&request, &socket))).is_err() {
            error!(conn = %id, "websocket connection callback panicked");
            socket.close(close_code::INTERNAL_ERROR, "");
        }

        let max_frame_bytes = ctx.max_frame_bytes;
        let tracker = ctx.state.tracker.clone();
        tracker.spawn(async move {
            let _permit = permit;
            socket.read_loop(reader, buffer, max_frame_bytes).await;
            ctx.state.registry.remove(socket.id());
            info!(conn = %socket.id(), "websocket disconnected");
        });

        Ok(())
    }
}

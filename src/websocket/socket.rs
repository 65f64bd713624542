use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::error::WebSocketError;
use crate::http::connection::ConnectionId;
use crate::websocket::frame::{Frame, Opcode, close_code, decode_frame, encode_frame};

/// Callback fired for every inbound text message.
pub type MessageCallback = Arc<dyn Fn(&WebSocket, &str) + Send + Sync>;

/// Lifecycle of an upgraded connection.
///
/// ```text
/// Handshaking ──101 sent──▶ Open ──close sent/received──▶ Closing ──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketState {
    Handshaking,
    Open,
    Closing,
    Closed,
}

/// One upgraded connection.
///
/// Cheap to clone; every clone talks to the same socket. Outbound frames go
/// through a bounded queue drained by a dedicated writer task, so
/// [`send_string`](Self::send_string) never blocks and may be called from a
/// message callback or from any other thread. When the peer stops reading
/// and the queue fills, sends fail with [`WebSocketError::QueueFull`].
#[derive(Clone)]
pub struct WebSocket {
    inner: Arc<Inner>,
}

struct Inner {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    state: Mutex<WebSocketState>,
    callbacks: RwLock<Vec<MessageCallback>>,
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl WebSocket {
    /// Wraps the connection identified by `id`. The socket stays in the
    /// Handshaking state until it is opened.
    pub fn new(id: ConnectionId, peer: Option<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                peer,
                state: Mutex::new(WebSocketState::Handshaking),
                callbacks: RwLock::new(Vec::new()),
                outbound: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    pub fn state(&self) -> WebSocketState {
        *self.lock_state()
    }

    /// True iff this object was built for the connection `id`.
    pub fn represents(&self, id: ConnectionId) -> bool {
        self.inner.id == id
    }

    /// Registers a text-message callback. Callbacks run in registration
    /// order, one frame at a time.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&WebSocket, &str) + Send + Sync + 'static,
    {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Queues `data` as a single unmasked text frame.
    pub fn send_string(&self, data: &str) -> Result<(), WebSocketError> {
        if self.state() != WebSocketState::Open {
            return Err(WebSocketError::Closed);
        }
        self.send_frame(&Frame::text(data))
    }

    /// Starts the closing handshake. Further calls, or calls once the socket
    /// is already closing, do nothing.
    pub fn close(&self, code: u16, reason: &str) {
        {
            let mut state = self.lock_state();
            if *state != WebSocketState::Open {
                return;
            }
            *state = WebSocketState::Closing;
        }

        debug!(conn = %self.inner.id, code, "closing websocket");
        match self.send_frame(&Frame::close(code, reason)) {
            Ok(()) => {}
            Err(e @ WebSocketError::QueueFull { .. }) => {
                // The writer still flushes what is queued, then shuts the
                // socket so the peer sees EOF instead of a close frame.
                warn!(conn = %self.inner.id, error = %e, "close frame dropped");
                self.drop_outbound();
            }
            Err(e) => debug!(conn = %self.inner.id, error = %e, "close frame not sent"),
        }
    }

    /// Moves to Open and starts the writer task on `writer`, with room for
    /// `queue_frames` outbound frames.
    pub(crate) fn open<W>(&self, writer: W, queue_frames: usize, tracker: &TaskTracker)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_frames.max(1));
        *self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.lock_state() = WebSocketState::Open;

        tracker.spawn(write_loop(self.inner.id, writer, rx));
    }

    /// Reads frames until the peer closes, the socket fails, or the peer
    /// breaks the protocol. Leaves the socket Closed.
    pub(crate) async fn read_loop<R>(&self, mut reader: R, mut buffer: BytesMut, max_frame_bytes: usize)
    where
        R: AsyncRead + Unpin,
    {
        match self.drive(&mut reader, &mut buffer, max_frame_bytes).await {
            Ok(()) => debug!(conn = %self.inner.id, "websocket closed"),
            Err(e) => {
                warn!(conn = %self.inner.id, error = %e, "websocket terminated");
                let code = match e {
                    WebSocketError::Protocol(_) => Some(close_code::PROTOCOL_ERROR),
                    WebSocketError::InvalidUtf8 => Some(close_code::INVALID_PAYLOAD),
                    WebSocketError::FrameTooLarge { .. } => Some(close_code::MESSAGE_TOO_BIG),
                    _ => None,
                };
                if let Some(code) = code {
                    self.close(code, "");
                }
            }
        }

        self.finish();
    }

    async fn drive<R>(
        &self,
        reader: &mut R,
        buffer: &mut BytesMut,
        max_frame_bytes: usize,
    ) -> Result<(), WebSocketError>
    where
        R: AsyncRead + Unpin,
    {
        // Opcode and bytes of a fragmented message still being assembled.
        let mut partial: Option<(Opcode, Vec<u8>)> = None;

        loop {
            let (frame, used) = match decode_frame(&buffer[..], true, max_frame_bytes)? {
                Some(decoded) => decoded,
                None => {
                    match reader.read_buf(buffer).await {
                        Ok(0) => {
                            debug!(conn = %self.inner.id, "peer disconnected without close frame");
                            return Ok(());
                        }
                        Ok(_) => continue,
                        Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(()),
                        Err(e) => return Err(e.into()),
                    }
                }
            };
            buffer.advance(used);

            trace!(conn = %self.inner.id, opcode = ?frame.opcode, len = frame.payload.len(), "frame received");

            match frame.opcode {
                Opcode::Text | Opcode::Binary => {
                    if partial.is_some() {
                        return Err(WebSocketError::Protocol(
                            "new data frame while a fragmented message is open".into(),
                        ));
                    }
                    if frame.fin {
                        self.deliver(frame.opcode, frame.payload)?;
                    } else {
                        partial = Some((frame.opcode, frame.payload));
                    }
                }
                Opcode::Continuation => {
                    let Some((_, assembled)) = partial.as_mut() else {
                        return Err(WebSocketError::Protocol(
                            "continuation frame without a message to continue".into(),
                        ));
                    };
                    let size = assembled.len() + frame.payload.len();
                    if size > max_frame_bytes {
                        return Err(WebSocketError::FrameTooLarge {
                            size: size as u64,
                            limit: max_frame_bytes,
                        });
                    }
                    assembled.extend_from_slice(&frame.payload);

                    if frame.fin {
                        if let Some((opcode, payload)) = partial.take() {
                            self.deliver(opcode, payload)?;
                        }
                    }
                }
                Opcode::Close => {
                    let received = frame.close_code();
                    let code = match (frame.payload.len(), received) {
                        (0, _) => close_code::NORMAL,
                        (_, Some(code)) if close_code::is_sendable(code) => code,
                        _ => close_code::PROTOCOL_ERROR,
                    };
                    debug!(conn = %self.inner.id, ?received, reply = code, "close frame received");
                    // Echo unless we started the closing handshake ourselves.
                    self.close(code, "");
                    return Ok(());
                }
                Opcode::Ping => {
                    self.send_frame(&Frame::pong(&frame.payload))?;
                }
                Opcode::Pong => {}
            }
        }
    }

    fn deliver(&self, opcode: Opcode, payload: Vec<u8>) -> Result<(), WebSocketError> {
        if opcode != Opcode::Text {
            debug!(conn = %self.inner.id, len = payload.len(), "ignoring binary message");
            return Ok(());
        }
        if self.state() != WebSocketState::Open {
            return Ok(());
        }

        let text = String::from_utf8(payload).map_err(|_| WebSocketError::InvalidUtf8)?;

        let callbacks = self
            .inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(self, &text))).is_err() {
                warn!(conn = %self.inner.id, "message callback panicked");
            }
        }

        Ok(())
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), WebSocketError> {
        let outbound = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(tx) = outbound.as_ref() else {
            return Err(WebSocketError::Closed);
        };

        tx.try_send(encode_frame(frame, None)).map_err(|e| match e {
            TrySendError::Full(_) => WebSocketError::QueueFull {
                capacity: tx.max_capacity(),
            },
            TrySendError::Closed(_) => WebSocketError::Closed,
        })
    }

    fn drop_outbound(&self) {
        self.inner
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Enters Closed: the writer drains what is queued and shuts the socket,
    /// and callbacks are dropped so clones captured in them are released.
    fn finish(&self) {
        *self.lock_state() = WebSocketState::Closed;
        self.drop_outbound();
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WebSocketState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn write_loop<W>(id: ConnectionId, mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(conn = %id, error = %e, "websocket write failed");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(conn = %id, error = %e, "websocket flush failed");
            return;
        }
    }

    let _ = writer.shutdown().await;
    trace!(conn = %id, "websocket writer finished");
}

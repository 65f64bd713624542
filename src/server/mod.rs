//! The embeddable server: route registration and start/halt lifecycle.
//!
//! ```ignore
//! use switchyard::{Method, Server};
//!
//! let mut server = Server::new(8080);
//! server.on(Method::GET, "/hello", |_req, res| {
//!     res.status(200).append("hello");
//!     Ok(())
//! });
//! server.start(false).await?;
//! // ...
//! server.halt().await;
//! ```

pub mod listener;
pub mod router;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::handler::RequestHandler;
use crate::http::parser::ParseLimits;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::websocket::{SocketRegistry, WebSocket, close_code};

pub use router::{Router, WebSocketRoute};

/// Read-only view of the server for an operator console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub listening: bool,
    pub local_addr: Option<SocketAddr>,
    /// Connections still in their HTTP request/response phase.
    pub active_connections: usize,
    /// Upgraded connections in the live-socket set.
    pub websocket_connections: usize,
}

/// State shared between the server handle and every task it spawns.
pub(crate) struct ServerState {
    pub(crate) listening: AtomicBool,
    pub(crate) active_connections: AtomicUsize,
    pub(crate) registry: SocketRegistry,
    pub(crate) tracker: TaskTracker,
    local_addr: StdMutex<Option<SocketAddr>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            listening: AtomicBool::new(false),
            active_connections: AtomicUsize::new(0),
            registry: SocketRegistry::new(),
            tracker: TaskTracker::new(),
            local_addr: StdMutex::new(None),
        }
    }

    /// Counts a connection as active until the returned guard drops.
    pub(crate) fn track_connection(&self) -> ActiveConnection<'_> {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ActiveConnection { state: self }
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addr;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct ActiveConnection<'a> {
    state: &'a ServerState,
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a connection task needs, frozen when `start` is called.
pub(crate) struct ServeContext {
    pub(crate) router: Router,
    pub(crate) state: Arc<ServerState>,
    pub(crate) limits: ParseLimits,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) max_frame_bytes: usize,
    pub(crate) websocket_queue_frames: usize,
    pub(crate) close_websockets_on_halt: bool,
}

/// Handle to one running accept loop.
struct Running {
    shutdown: CancellationToken,
}

pub struct Server {
    config: ServerConfig,
    router: Router,
    state: Arc<ServerState>,
    running: Mutex<Option<Running>>,
}

impl Server {
    /// Stores the port; nothing is bound until [`start`](Self::start).
    pub fn new(port: u16) -> Self {
        Self::with_config(ServerConfig::with_port(port))
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            state: Arc::new(ServerState::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Registers a handler for an exact method and path. Duplicates are
    /// accepted but never reached: the first registration wins.
    ///
    /// Routes registered after `start` apply from the next `start`.
    pub fn on<F>(&mut self, method: Method, path: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.router
            .add_handler(RequestHandler::new(method, path, callback));
        self
    }

    /// Registers a path that accepts the WebSocket upgrade. `callback` runs
    /// once per connection, before any message is delivered, and is the
    /// place to attach message callbacks.
    pub fn on_websocket_connection<F>(&mut self, path: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&Request, &WebSocket) + Send + Sync + 'static,
    {
        self.router
            .add_websocket_route(WebSocketRoute::new(path, callback));
        self
    }

    /// Binds the listener and starts accepting.
    ///
    /// With `blocking` false this returns as soon as the socket is bound.
    /// With `blocking` true it returns only after [`halt`](Self::halt) has
    /// drained every connection.
    pub async fn start(&self, blocking: bool) -> Result<(), ServerError> {
        let shutdown = {
            let mut running = self.running.lock().await;
            if running.is_some() {
                return Err(ServerError::AlreadyListening);
            }

            let listener = listener::bind(&self.config.listen_addr()).await?;
            let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
                addr: self.config.listen_addr(),
                source,
            })?;

            let ctx = Arc::new(ServeContext {
                router: self.router.clone(),
                state: self.state.clone(),
                limits: ParseLimits {
                    max_head_bytes: self.config.max_head_bytes,
                    max_body_bytes: self.config.max_body_bytes,
                },
                read_timeout: self.config.read_timeout(),
                max_frame_bytes: self.config.max_frame_bytes,
                websocket_queue_frames: self.config.websocket_queue_frames,
                close_websockets_on_halt: self.config.close_websockets_on_halt,
            });

            let limit = (self.config.max_connections > 0)
                .then(|| Arc::new(Semaphore::new(self.config.max_connections)));

            let shutdown = CancellationToken::new();
            self.state.tracker.reopen();
            self.state
                .tracker
                .spawn(listener::run(listener, ctx, shutdown.clone(), limit));

            self.state.set_local_addr(Some(local_addr));
            self.state.listening.store(true, Ordering::SeqCst);
            *running = Some(Running {
                shutdown: shutdown.clone(),
            });

            info!(
                addr = %local_addr,
                routes = self.router.handlers().len(),
                websocket_routes = self.router.websocket_routes().len(),
                "server listening"
            );

            shutdown
        };

        if blocking {
            shutdown.cancelled().await;
            self.state.tracker.wait().await;
        }

        Ok(())
    }

    /// Stops admitting connections, closes the listener and waits for every
    /// outstanding connection task to finish. Does nothing when not
    /// listening.
    pub async fn halt(&self) {
        // Held until the drain completes so a concurrent start cannot reopen
        // the task group underneath us.
        let mut running = self.running.lock().await;
        let Some(run) = running.take() else {
            debug!("halt called while not listening");
            return;
        };

        info!("halting server");
        // Upgrades that land after this store close themselves; see
        // `Connection::upgrade`.
        self.state.listening.store(false, Ordering::SeqCst);
        run.shutdown.cancel();

        if self.config.close_websockets_on_halt {
            for socket in self.state.registry.snapshot() {
                socket.close(close_code::GOING_AWAY, "server shutting down");
            }
        }

        self.state.tracker.close();
        self.state.tracker.wait().await;
        self.state.set_local_addr(None);

        info!("server halted");
    }

    pub fn listening(&self) -> bool {
        self.state.listening.load(Ordering::SeqCst)
    }

    /// Address actually bound, which differs from the configured one when
    /// port 0 was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.local_addr()
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            listening: self.listening(),
            local_addr: self.local_addr(),
            active_connections: self.state.active_connections.load(Ordering::SeqCst),
            websocket_connections: self.state.registry.len(),
        }
    }

    /// Every live WebSocket, e.g. for broadcasting.
    pub fn websockets(&self) -> Vec<WebSocket> {
        self.state.registry.snapshot()
    }
}

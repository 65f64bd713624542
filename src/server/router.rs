use std::fmt;
use std::sync::Arc;

use crate::http::handler::RequestHandler;
use crate::http::request::Request;
use crate::websocket::WebSocket;

/// Callback invoked once a connection has been upgraded on a route.
pub type WebSocketConnectionCallback = Arc<dyn Fn(&Request, &WebSocket) + Send + Sync>;

/// A path eligible for the WebSocket upgrade.
#[derive(Clone)]
pub struct WebSocketRoute {
    path: String,
    callback: WebSocketConnectionCallback,
}

impl WebSocketRoute {
    pub fn new<F>(path: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Request, &WebSocket) + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connected(&self, request: &Request, socket: &WebSocket) {
        (self.callback)(request, socket)
    }
}

impl fmt::Debug for WebSocketRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketRoute")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Both route tables, scanned in registration order. The first match wins;
/// later duplicates are never reached.
#[derive(Debug, Clone, Default)]
pub struct Router {
    handlers: Vec<RequestHandler>,
    websocket_routes: Vec<WebSocketRoute>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: RequestHandler) {
        self.handlers.push(handler);
    }

    pub fn add_websocket_route(&mut self, route: WebSocketRoute) {
        self.websocket_routes.push(route);
    }

    pub fn find_handler(&self, request: &Request) -> Option<&RequestHandler> {
        self.handlers.iter().find(|h| h.should_execute_for(request))
    }

    /// Upgrade routes match on the exact path; there is no method criterion.
    pub fn find_websocket_route(&self, path: &str) -> Option<&WebSocketRoute> {
        self.websocket_routes.iter().find(|r| r.path == path)
    }

    pub fn handlers(&self) -> &[RequestHandler] {
        &self.handlers
    }

    pub fn websocket_routes(&self) -> &[WebSocketRoute] {
        &self.websocket_routes
    }
}

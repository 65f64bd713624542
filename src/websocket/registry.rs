use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::http::connection::ConnectionId;
use crate::websocket::socket::WebSocket;

/// The set of live WebSockets, keyed by connection.
///
/// A connection appears at most once. Lookups and updates take a short lock
/// that is never held across an await.
#[derive(Debug, Default)]
pub struct SocketRegistry {
    sockets: Mutex<HashMap<ConnectionId, WebSocket>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `socket` unless its connection is already registered. Returns
    /// whether it was added.
    pub fn insert(&self, socket: WebSocket) -> bool {
        let mut sockets = self.lock();
        if sockets.values().any(|existing| existing.represents(socket.id())) {
            return false;
        }
        sockets.insert(socket.id(), socket);
        true
    }

    pub fn remove(&self, id: ConnectionId) -> Option<WebSocket> {
        self.lock().remove(&id)
    }

    /// True if some registered socket represents `id`.
    pub fn represents(&self, id: ConnectionId) -> bool {
        self.lock().values().any(|socket| socket.represents(id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clones of every live socket, e.g. for broadcasting.
    pub fn snapshot(&self) -> Vec<WebSocket> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, WebSocket>> {
        self.sockets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

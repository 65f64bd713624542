use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::http::connection::{Connection, ConnectionId};
use crate::server::ServeContext;

const BACKLOG: u32 = 1024;

/// Opens a listening socket on `addr` with address reuse enabled.
pub(crate) async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let bind_err = |source: std::io::Error| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };

    let resolved: SocketAddr = tokio::net::lookup_host(addr)
        .await
        .map_err(bind_err)?
        .next()
        .ok_or_else(|| {
            bind_err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address did not resolve",
            ))
        })?;

    let socket = if resolved.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(resolved).map_err(bind_err)?;
    socket.listen(BACKLOG).map_err(bind_err)
}

/// Accepts connections until `shutdown` fires, spawning one task per
/// connection into the server's task group.
///
/// With a connection limit, a permit is taken before accepting so excess
/// clients wait in the kernel backlog.
pub(crate) async fn run(
    listener: TcpListener,
    ctx: Arc<ServeContext>,
    shutdown: CancellationToken,
    limit: Option<Arc<Semaphore>>,
) {
    loop {
        let permit = match &limit {
            Some(semaphore) => tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
            },
            None => None,
        };

        let (socket, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Usually descriptor exhaustion; back off instead of spinning.
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };

        let id = ConnectionId::next();
        debug!(conn = %id, peer = %peer, "accepted connection");

        let ctx = ctx.clone();
        let tracker = ctx.state.tracker.clone();
        tracker.spawn(async move {
            let _active = ctx.state.track_connection();
            let conn = Connection::new(id, peer, socket, ctx.clone(), permit);
            if let Err(e) = conn.run().await {
                error!(conn = %id, peer = %peer, "connection error: {e:#}");
            }
        });
    }

    info!("listener stopped");
}

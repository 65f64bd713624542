use switchyard::{Method, Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = ServerConfig::load()?;

    let mut server = Server::with_config(cfg);

    server.on(Method::GET, "/", |_req, res| {
        res.header("Content-Type", "text/plain")
            .append("Hello from Switchyard\n");
        Ok(())
    });

    server.on_websocket_connection("/ws", |req, ws| {
        tracing::info!(peer = ?ws.peer_addr(), path = %req.path(), "echo client joined");
        ws.on_message(|ws, msg| {
            if let Err(e) = ws.send_string(msg) {
                tracing::warn!(error = %e, "echo failed");
            }
        });
    });

    server.start(false).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.halt().await;

    Ok(())
}

//! Dots and Boxes Game Server
//!
//! Hosts a single authoritative game over WebSocket.
//! Configuration comes from `DOTS_*` environment variables, log filtering
//! from `RUST_LOG`.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dots_boxes::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    info!("Dots and Boxes Server v{}", VERSION);
    info!(
        "Grid: {}x{} dots ({} cells)",
        config.grid.rows(),
        config.grid.cols(),
        config.grid.cell_count()
    );
    info!("Max connections: {}", config.max_connections);

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}

//! Serve command implementation.

use cartsync_server::{CoordinatorServer, ServerConfig};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the coordinator until Ctrl-C.
pub fn run(
    bind: SocketAddr,
    delivery_capacity: usize,
    max_members: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::new(bind)
        .with_delivery_capacity(delivery_capacity)
        .with_max_members_per_channel(max_members);
    let server = CoordinatorServer::new(config);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown requested"),
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; stopping"),
            }
            trigger.cancel();
        });

        server.run(shutdown).await?;
        let stats = server.stats();
        info!(
            broadcast = stats.messages_broadcast,
            delivered = stats.messages_delivered,
            dropped = stats.messages_dropped,
            "final coordinator stats"
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

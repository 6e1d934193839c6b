//! WebSocket front end of the coordinator.

use crate::config::ServerConfig;
use crate::coordinator::{BroadcastCoordinator, CoordinatorStats};
use crate::error::{ServerError, ServerResult};
use crate::session::serve_session;
use cartsync_protocol::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The coordinator server.
///
/// Accepts WebSocket connections and runs one [`serve_session`] per
/// connection. Each binary message carries one CBOR-encoded frame.
///
/// # Example
///
/// ```no_run
/// use cartsync_server::{CoordinatorServer, ServerConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> cartsync_server::ServerResult<()> {
/// let server = CoordinatorServer::new(ServerConfig::default());
/// server.run(CancellationToken::new()).await
/// # }
/// ```
#[derive(Debug)]
pub struct CoordinatorServer {
    config: ServerConfig,
    coordinator: Arc<BroadcastCoordinator>,
}

impl CoordinatorServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(BroadcastCoordinator::new(&config));
        Self {
            config,
            coordinator,
        }
    }

    /// Returns the shared coordinator.
    pub fn coordinator(&self) -> &Arc<BroadcastCoordinator> {
        &self.coordinator
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns coordinator statistics.
    pub fn stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or accepting fails.
    pub async fn run(&self, shutdown: CancellationToken) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires. Open connections are closed on shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> ServerResult<()> {
        info!(addr = %listener.local_addr()?, "coordinator listening");

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };
            debug!(%addr, "tcp connection accepted");

            let coordinator = self.coordinator.clone();
            let buffer = self.config.frame_buffer;
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, coordinator, buffer, shutdown).await {
                    error!(%addr, error = %e, "connection failed");
                }
            });
        }

        info!("coordinator stopped");
        Ok(())
    }
}

/// Bridges one WebSocket to a session.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<BroadcastCoordinator>,
    buffer: usize,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    debug!(%addr, "websocket established");

    let (client_tx, client_rx) = mpsc::channel::<ClientFrame>(buffer);
    let (server_tx, mut server_rx) = mpsc::channel::<ServerFrame>(buffer);
    let session = tokio::spawn(serve_session(coordinator, client_rx, server_tx));

    let result = async {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = stream.next() => match message {
                    Some(Ok(Message::Binary(data))) => match ClientFrame::decode(&data) {
                        Ok(frame) => {
                            if client_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(%addr, error = %e, "undecodable frame");
                            let reply = ServerFrame::Error { message: e.to_string() };
                            sink.send(Message::Binary(reply.encode()?.into())).await?;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%addr, error = %e, "websocket read failed");
                        break;
                    }
                },
                frame = server_rx.recv() => match frame {
                    Some(frame) => sink.send(Message::Binary(frame.encode()?.into())).await?,
                    None => break,
                },
            }
        }
        Ok::<(), ServerError>(())
    }
    .await;

    drop(client_tx);
    drop(server_rx);
    if let Err(e) = session.await {
        warn!(%addr, error = %e, "session task ended abnormally");
    }
    let _ = sink.close().await;
    debug!(%addr, "websocket closed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_lifecycle() {
        let server = CoordinatorServer::new(ServerConfig::default());
        assert_eq!(server.stats(), CoordinatorStats::default());
        assert_eq!(server.config().max_members_per_channel, 64);
    }

    #[tokio::test]
    async fn shutdown_stops_accept_loop() {
        let server = CoordinatorServer::new(ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        server.serve(listener, shutdown).await.unwrap();
    }
}

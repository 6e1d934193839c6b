//! WebSocket transport.
//!
//! Each [`ClientFrame`] and [`ServerFrame`] travels CBOR-encoded in one
//! binary WebSocket message. A writer task and a reader task bridge the
//! socket to the channels of a [`Link`].

use crate::error::{SyncError, SyncResult};
use crate::transport::{Link, RemoteEnd, Transport};
use async_trait::async_trait;
use cartsync_protocol::ServerFrame;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

/// Opens links over WebSocket connections.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    buffer: usize,
}

impl WebSocketTransport {
    /// Creates a transport for the coordinator at `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: 64,
        }
    }

    /// Sets the per-direction frame buffer.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Returns the coordinator URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify(err: tungstenite::Error) -> SyncError {
    match err {
        tungstenite::Error::Url(e) => SyncError::transport_fatal(format!("invalid url: {e}")),
        tungstenite::Error::HttpFormat(e) => {
            SyncError::transport_fatal(format!("invalid request: {e}"))
        }
        other => SyncError::transport_retryable(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> SyncResult<Link> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(classify)?;
        debug!(url = %self.url, "websocket connected");

        let (mut sink, mut stream) = ws.split();
        let (link, remote) = Link::pair(self.buffer);
        let RemoteEnd {
            mut inbound,
            outbound,
        } = remote;

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let bytes = match frame.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(data)) => match ServerFrame::decode(&data) {
                        Ok(frame) => {
                            if outbound.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(link)
    }
}

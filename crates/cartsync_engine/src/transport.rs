//! Transport layer abstraction for the sync channel.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use cartsync_protocol::{ClientFrame, ServerFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

/// One open connection to the coordinator.
///
/// Dropping the `outbound` sender closes the connection from the client
/// side; `inbound` yielding `None` means the coordinator side is gone.
#[derive(Debug)]
pub struct Link {
    /// Frames to the coordinator.
    pub outbound: mpsc::Sender<ClientFrame>,
    /// Frames from the coordinator.
    pub inbound: mpsc::Receiver<ServerFrame>,
}

/// The coordinator's end of an in-process [`Link`].
#[derive(Debug)]
pub struct RemoteEnd {
    /// Frames sent by the client.
    pub inbound: mpsc::Receiver<ClientFrame>,
    /// Frames to the client.
    pub outbound: mpsc::Sender<ServerFrame>,
}

impl Link {
    /// Creates a connected link and its remote end.
    pub fn pair(buffer: usize) -> (Link, RemoteEnd) {
        let (client_tx, client_rx) = mpsc::channel(buffer.max(1));
        let (server_tx, server_rx) = mpsc::channel(buffer.max(1));
        (
            Link {
                outbound: client_tx,
                inbound: server_rx,
            },
            RemoteEnd {
                inbound: client_rx,
                outbound: server_tx,
            },
        )
    }
}

/// A sync transport opens links to the coordinator.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (WebSocket, in-process loopback, mock for testing).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new link.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] if the coordinator is unreachable.
    async fn open(&self) -> SyncResult<Link>;
}

enum Scripted {
    Fail { retryable: bool },
    Accept,
}

/// A mock transport for testing.
///
/// Each successful `open` hands the coordinator side of the link to the
/// test through [`next_peer`](Self::next_peer), so the test plays the
/// coordinator by hand. Failures can be scripted ahead of time.
pub struct MockTransport {
    script: Mutex<Vec<Scripted>>,
    opens: AtomicU32,
    peers_tx: mpsc::UnboundedSender<RemoteEnd>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteEnd>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("opens", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a mock transport that accepts every open.
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(Vec::new()),
            opens: AtomicU32::new(0),
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
        }
    }

    /// Makes the next `count` opens fail with a retryable error.
    pub fn fail_next(&self, count: usize) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.push(Scripted::Fail { retryable: true });
        }
    }

    /// Makes the next open fail with a non-retryable error.
    pub fn fail_fatal(&self) {
        self.script.lock().push(Scripted::Fail { retryable: false });
    }

    /// Queues an explicit successful open after earlier scripted failures.
    pub fn accept_next(&self) {
        self.script.lock().push(Scripted::Accept);
    }

    /// Returns how many times `open` was called.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Waits for the coordinator side of the next accepted link.
    pub async fn next_peer(&self) -> Option<RemoteEnd> {
        self.peers_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> SyncResult<Link> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock();
            if script.is_empty() {
                Scripted::Accept
            } else {
                script.remove(0)
            }
        };

        match step {
            Scripted::Fail { retryable: true } => {
                Err(SyncError::transport_retryable("mock: connection refused"))
            }
            Scripted::Fail { retryable: false } => {
                Err(SyncError::transport_fatal("mock: invalid endpoint"))
            }
            Scripted::Accept => {
                let (link, remote) = Link::pair(64);
                self.peers_tx
                    .send(remote)
                    .map_err(|_| SyncError::transport_fatal("mock: peer receiver dropped"))?;
                Ok(link)
            }
        }
    }
}

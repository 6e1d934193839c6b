//! The per-connection session loop.
//!
//! [`serve_session`] speaks the frame protocol over a pair of channels and
//! knows nothing about sockets, so the same loop serves WebSocket
//! connections and in-process links.

use crate::coordinator::BroadcastCoordinator;
use crate::error::ServerError;
use cartsync_protocol::{ChannelKey, ClientFrame, ConnectionId, ServerFrame, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Unregisters the connection on every exit path.
struct SessionGuard {
    coordinator: Arc<BroadcastCoordinator>,
    connection_id: ConnectionId,
    joined: HashSet<UserId>,
}

impl SessionGuard {
    fn handle(&mut self, frame: ClientFrame) -> Option<ServerFrame> {
        match frame {
            ClientFrame::Join { channel } => {
                let user_id = channel.user_id();
                match self.coordinator.join(&user_id, self.connection_id) {
                    Ok(channel) => {
                        self.joined.insert(user_id);
                        Some(ServerFrame::Joined { channel })
                    }
                    Err(e) => Some(error_frame(&e)),
                }
            }
            ClientFrame::Leave { channel } => {
                let user_id = channel.user_id();
                self.coordinator.leave(&user_id, self.connection_id);
                self.joined.remove(&user_id);
                Some(ServerFrame::Left { channel })
            }
            ClientFrame::Publish { channel, event } => {
                let user_id = channel.user_id();
                if !self.joined.contains(&user_id) {
                    return Some(error_frame(&not_joined(&channel)));
                }
                let delivered = self
                    .coordinator
                    .broadcast(&user_id, event, self.connection_id);
                debug!(%channel, delivered, "published");
                None
            }
            ClientFrame::Ping => Some(ServerFrame::Pong),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        for user_id in self.joined.drain() {
            self.coordinator.leave(&user_id, self.connection_id);
        }
        self.coordinator.unregister(self.connection_id);
        debug!(connection_id = %self.connection_id, "session closed");
    }
}

fn not_joined(channel: &ChannelKey) -> ServerError {
    ServerError::InvalidChannel(format!("{channel} is not joined"))
}

fn error_frame(err: &ServerError) -> ServerFrame {
    ServerFrame::Error {
        message: err.to_string(),
    }
}

/// Runs one client connection until either side goes away.
///
/// Registers the connection, sends `Welcome` with the assigned
/// [`ConnectionId`], then answers client frames and forwards broadcast
/// events. When `inbound` closes or `outbound` is dropped the connection
/// leaves all its channels and is unregistered.
pub async fn serve_session(
    coordinator: Arc<BroadcastCoordinator>,
    mut inbound: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::Sender<ServerFrame>,
) {
    let (connection_id, mut deliveries) = coordinator.register();
    let mut guard = SessionGuard {
        coordinator,
        connection_id,
        joined: HashSet::new(),
    };

    if outbound
        .send(ServerFrame::Welcome { connection_id })
        .await
        .is_err()
    {
        return;
    }
    info!(%connection_id, "session started");

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(frame) => {
                    if let Some(reply) = guard.handle(frame) {
                        if outbound.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                None => break,
            },
            envelope = deliveries.recv() => match envelope {
                Some(envelope) => {
                    if outbound.send(ServerFrame::Event(envelope)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use cartsync_protocol::{MutationEvent, ProductId, SequencedEvent};

    struct Client {
        tx: mpsc::Sender<ClientFrame>,
        rx: mpsc::Receiver<ServerFrame>,
        id: ConnectionId,
    }

    impl Client {
        async fn connect(coordinator: &Arc<BroadcastCoordinator>) -> Client {
            let (tx, inbound) = mpsc::channel(16);
            let (outbound, mut rx) = mpsc::channel(16);
            tokio::spawn(serve_session(coordinator.clone(), inbound, outbound));
            let id = match rx.recv().await.unwrap() {
                ServerFrame::Welcome { connection_id } => connection_id,
                other => panic!("expected welcome, got {other:?}"),
            };
            Client { tx, rx, id }
        }

        async fn request(&mut self, frame: ClientFrame) -> ServerFrame {
            self.tx.send(frame).await.unwrap();
            self.rx.recv().await.unwrap()
        }

        async fn next_event(&mut self) -> SequencedEvent {
            match self.rx.recv().await.unwrap() {
                ServerFrame::Event(envelope) => envelope,
                other => panic!("expected event, got {other:?}"),
            }
        }
    }

    fn channel(user: &str) -> ChannelKey {
        ChannelKey::for_user(&UserId::new(user))
    }

    async fn wait_until_unregistered(coordinator: &BroadcastCoordinator, id: ConnectionId) {
        for _ in 0..100 {
            if !coordinator.is_registered(id) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("connection {id} still registered");
    }

    #[tokio::test]
    async fn join_publish_fan_out() {
        let coord = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
        let mut a = Client::connect(&coord).await;
        let mut b = Client::connect(&coord).await;

        assert_eq!(
            a.request(ClientFrame::Join { channel: channel("42") }).await,
            ServerFrame::Joined { channel: channel("42") }
        );
        b.request(ClientFrame::Join { channel: channel("42") }).await;

        a.tx.send(ClientFrame::Publish {
            channel: channel("42"),
            event: MutationEvent::removed(ProductId(7)),
        })
        .await
        .unwrap();

        let at_a = a.next_event().await;
        let at_b = b.next_event().await;
        assert_eq!(at_a, at_b);
        assert!(at_a.is_from(a.id));
        assert_eq!(at_b.event, MutationEvent::removed(ProductId(7)));
    }

    #[tokio::test]
    async fn publish_without_join_is_rejected() {
        let coord = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
        let mut a = Client::connect(&coord).await;

        let reply = a
            .request(ClientFrame::Publish {
                channel: channel("42"),
                event: MutationEvent::CartCleared,
            })
            .await;
        assert!(matches!(reply, ServerFrame::Error { ref message } if message.contains("cart_42")));
        assert_eq!(coord.stats().messages_broadcast, 0);
    }

    #[tokio::test]
    async fn full_channel_rejects_join() {
        let coord = Arc::new(BroadcastCoordinator::new(
            &ServerConfig::default().with_max_members_per_channel(1),
        ));
        let mut a = Client::connect(&coord).await;
        let mut b = Client::connect(&coord).await;

        a.request(ClientFrame::Join { channel: channel("42") }).await;
        let reply = b.request(ClientFrame::Join { channel: channel("42") }).await;
        assert!(matches!(reply, ServerFrame::Error { .. }));
    }

    #[tokio::test]
    async fn ping_pong_and_leave() {
        let coord = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
        let mut a = Client::connect(&coord).await;

        assert_eq!(a.request(ClientFrame::Ping).await, ServerFrame::Pong);
        a.request(ClientFrame::Join { channel: channel("42") }).await;
        assert_eq!(coord.stats().active_channels, 1);

        assert_eq!(
            a.request(ClientFrame::Leave { channel: channel("42") }).await,
            ServerFrame::Left { channel: channel("42") }
        );
        assert_eq!(coord.stats().active_channels, 0);
    }

    #[tokio::test]
    async fn closing_inbound_cleans_up() {
        let coord = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
        let mut a = Client::connect(&coord).await;
        a.request(ClientFrame::Join { channel: channel("42") }).await;
        assert_eq!(coord.stats().active_connections, 1);

        let id = a.id;
        drop(a);
        wait_until_unregistered(&coord, id).await;
        assert_eq!(coord.stats().active_channels, 0);
    }

    #[tokio::test]
    async fn dropped_receiver_cleans_up_on_next_send() {
        let coord = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
        let mut a = Client::connect(&coord).await;
        let mut b = Client::connect(&coord).await;
        a.request(ClientFrame::Join { channel: channel("42") }).await;
        b.request(ClientFrame::Join { channel: channel("42") }).await;

        let Client { tx: b_tx, rx: b_rx, id: b_id } = b;
        drop(b_rx);

        a.tx.send(ClientFrame::Publish {
            channel: channel("42"),
            event: MutationEvent::CartCleared,
        })
        .await
        .unwrap();
        a.next_event().await;

        wait_until_unregistered(&coord, b_id).await;
        assert_eq!(coord.members(&UserId::new("42")), vec![a.id]);
        drop(b_tx);
    }
}

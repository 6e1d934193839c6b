//! The sync channel client.
//!
//! A background task owns the link to the coordinator. It joins the user's
//! channel, publishes events from the store's outbox, and hands events from
//! other sessions to [`CartStore::apply_remote`]. Connectivity is reported
//! through [`ConnectionState`]; errors never reach cart operations.
//!
//! ```text
//!   Disconnected ──connect──▶ Connecting ──joined──▶ Connected
//!        ▲                        │                     │ link lost
//!        └──── attempts exhausted ┴──── Reconnecting ◀──┘
//! ```

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::CartStore;
use crate::transport::{Link, Transport};
use cartsync_protocol::{
    ChannelKey, ClientFrame, ConnectionId, MutationEvent, SequencedEvent, ServerFrame, UserId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connectivity of a [`SyncChannelClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection task, or it gave up.
    Disconnected,
    /// Opening the first link.
    Connecting,
    /// Joined and exchanging events.
    Connected,
    /// An established link was lost; trying again.
    Reconnecting,
}

impl ConnectionState {
    /// Returns true while a connection task is working on a link.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Statistics about the sync channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Events published to the coordinator.
    pub events_published: u64,
    /// Remote events handed to the store.
    pub events_applied: u64,
    /// Own events discarded on their way back.
    pub echoes_suppressed: u64,
    /// Established links that were lost.
    pub reconnects: u64,
    /// Connection attempts that failed.
    pub failed_attempts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    applied: AtomicU64,
    suppressed: AtomicU64,
    reconnects: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SyncStats {
        SyncStats {
            events_published: self.published.load(Ordering::Relaxed),
            events_applied: self.applied.load(Ordering::Relaxed),
            echoes_suppressed: self.suppressed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            failed_attempts: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Session {
    user_id: UserId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type OutboxSlot = Arc<Mutex<Option<mpsc::Receiver<MutationEvent>>>>;

/// Keeps one [`CartStore`] in step with the user's other sessions.
pub struct SyncChannelClient {
    store: Arc<CartStore>,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    counters: Arc<Counters>,
    outbox: OutboxSlot,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for SyncChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannelClient")
            .field("state", &self.state())
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}

impl SyncChannelClient {
    /// Creates a disconnected client for `store`.
    pub fn new(store: Arc<CartStore>, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            store,
            transport,
            config,
            state: Arc::new(state),
            counters: Arc::new(Counters::default()),
            outbox: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    /// Starts syncing the cart of `user_id`.
    ///
    /// Spawns the connection task on the current Tokio runtime and returns
    /// at once; watch [`subscribe_state`](Self::subscribe_state) for the
    /// outcome. Events produced while offline wait in the outbox and are
    /// published after the join.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyConnected`] if a connection task is
    /// still running.
    pub fn connect(&self, user_id: impl Into<UserId>) -> SyncResult<()> {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return Err(SyncError::AlreadyConnected);
        }

        let user_id = user_id.into();
        let outbox = self
            .outbox
            .lock()
            .take()
            .unwrap_or_else(|| self.store.attach_outbox(self.config.outbox_capacity));
        let cancel = CancellationToken::new();
        self.state.send_replace(ConnectionState::Connecting);

        let worker = Worker {
            store: self.store.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
            channel: ChannelKey::for_user(&user_id),
            state: self.state.clone(),
            counters: self.counters.clone(),
            cancel: cancel.clone(),
        };
        let slot = self.outbox.clone();
        let task = tokio::spawn(async move {
            let outbox = worker.run(outbox).await;
            *slot.lock() = Some(outbox);
        });

        *session = Some(Session {
            user_id,
            cancel,
            task,
        });
        Ok(())
    }

    /// Stops syncing.
    ///
    /// Abandons any in-flight open or join, leaves the channel if joined,
    /// and waits for the connection task to finish. The outbox is kept, so
    /// events produced until the next [`connect`](Self::connect) are
    /// published then.
    pub async fn disconnect(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
            info!(user_id = %session.user_id, "sync channel disconnected");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Returns the current connectivity.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns true while joined to the channel.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribes to connectivity changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns the user of the current connection task, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.session.lock().as_ref().map(|s| s.user_id.clone())
    }

    /// Returns channel statistics.
    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    /// Returns the store this client feeds.
    pub fn store(&self) -> &Arc<CartStore> {
        &self.store
    }
}

impl Drop for SyncChannelClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

/// A joined link.
struct Joined {
    link: Link,
    connection_id: ConnectionId,
}

enum PumpExit {
    Cancelled,
    LinkLost,
}

struct Worker {
    store: Arc<CartStore>,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    channel: ChannelKey,
    state: Arc<watch::Sender<ConnectionState>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(
        self,
        mut outbox: mpsc::Receiver<MutationEvent>,
    ) -> mpsc::Receiver<MutationEvent> {
        let mut reconnecting = false;
        loop {
            let joined = match self.establish(reconnecting).await {
                Ok(joined) => joined,
                Err(SyncError::Cancelled) => break,
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "giving up on sync channel");
                    break;
                }
            };

            info!(channel = %self.channel, connection_id = %joined.connection_id, "sync channel joined");
            self.state.send_replace(ConnectionState::Connected);

            match self.pump(joined, &mut outbox).await {
                PumpExit::Cancelled => break,
                PumpExit::LinkLost => {
                    Counters::bump(&self.counters.reconnects);
                    warn!(channel = %self.channel, "sync link lost, reconnecting");
                    reconnecting = true;
                }
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        outbox
    }

    /// Opens and joins a link, retrying with backoff.
    async fn establish(&self, reconnecting: bool) -> SyncResult<Joined> {
        let retry = &self.config.retry;
        let mut last_error = SyncError::transport_retryable("no connection attempt made");

        for attempt in 0..retry.max_attempts {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, ?delay, "waiting before next connection attempt");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.state.send_replace(if reconnecting {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                outcome = tokio::time::timeout(self.config.join_timeout, self.handshake()) => outcome,
            };

            let error = match outcome {
                Ok(Ok(joined)) => return Ok(joined),
                Ok(Err(e)) => e,
                Err(_) => SyncError::Timeout,
            };
            Counters::bump(&self.counters.failed);
            debug!(attempt, error = %error, "connection attempt failed");

            if !error.is_retryable() {
                return Err(error);
            }
            last_error = error;
        }

        Err(last_error)
    }

    async fn handshake(&self) -> SyncResult<Joined> {
        let mut link = self.transport.open().await?;

        let connection_id = match link.inbound.recv().await {
            Some(ServerFrame::Welcome { connection_id }) => connection_id,
            Some(other) => {
                return Err(SyncError::Protocol(format!(
                    "expected welcome, got {other:?}"
                )))
            }
            None => return Err(SyncError::transport_retryable("link closed before welcome")),
        };

        link.outbound
            .send(ClientFrame::Join {
                channel: self.channel.clone(),
            })
            .await
            .map_err(|_| SyncError::transport_retryable("link closed during join"))?;

        loop {
            match link.inbound.recv().await {
                Some(ServerFrame::Joined { channel }) if channel == self.channel => {
                    return Ok(Joined {
                        link,
                        connection_id,
                    })
                }
                Some(ServerFrame::Error { message }) => return Err(SyncError::JoinRejected(message)),
                Some(other) => debug!(?other, "ignoring frame while joining"),
                None => return Err(SyncError::transport_retryable("link closed during join")),
            }
        }
    }

    /// Moves frames until the link drops or the task is cancelled.
    async fn pump(
        &self,
        joined: Joined,
        outbox: &mut mpsc::Receiver<MutationEvent>,
    ) -> PumpExit {
        let Joined {
            mut link,
            connection_id,
        } = joined;
        let mut outbox_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let leave = ClientFrame::Leave { channel: self.channel.clone() };
                    if link.outbound.try_send(leave).is_err() {
                        debug!("could not send leave on teardown");
                    }
                    return PumpExit::Cancelled;
                }
                frame = link.inbound.recv() => match frame {
                    Some(ServerFrame::Event(envelope)) => self.deliver(envelope, connection_id),
                    Some(ServerFrame::Error { message }) => {
                        warn!(channel = %self.channel, %message, "coordinator reported an error");
                    }
                    Some(other) => debug!(?other, "ignoring frame"),
                    None => return PumpExit::LinkLost,
                },
                event = outbox.recv(), if outbox_open => match event {
                    Some(event) => {
                        let frame = ClientFrame::Publish { channel: self.channel.clone(), event };
                        if link.outbound.send(frame).await.is_err() {
                            return PumpExit::LinkLost;
                        }
                        Counters::bump(&self.counters.published);
                    }
                    None => {
                        debug!("outbox closed");
                        outbox_open = false;
                    }
                },
            }
        }
    }

    fn deliver(&self, envelope: SequencedEvent, connection_id: ConnectionId) {
        if envelope.is_from(connection_id) {
            Counters::bump(&self.counters.suppressed);
            debug!(sequence = envelope.sequence, "suppressing own echo");
            return;
        }
        if envelope.channel != self.channel {
            debug!(channel = %envelope.channel, "ignoring event for another channel");
            return;
        }
        if self.cancel.is_cancelled() {
            return;
        }
        Counters::bump(&self.counters.applied);
        self.store.apply_remote(&envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::{MockTransport, RemoteEnd};
    use cartsync_protocol::{CartItem, Money, ProductId};
    use std::time::Duration;

    fn fast_config(attempts: u32) -> SyncConfig {
        SyncConfig::default()
            .with_retry(
                RetryConfig::new(attempts)
                    .with_initial_delay(Duration::from_millis(5))
                    .without_jitter(),
            )
            .with_join_timeout(Duration::from_millis(500))
    }

    fn client(transport: Arc<MockTransport>, attempts: u32) -> SyncChannelClient {
        SyncChannelClient::new(Arc::new(CartStore::new()), transport, fast_config(attempts))
    }

    async fn wait_for(client: &SyncChannelClient, wanted: ConnectionState) {
        let mut rx = client.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached in time")
            .unwrap();
    }

    /// Plays the coordinator side of a handshake.
    async fn accept(transport: &MockTransport) -> (RemoteEnd, ConnectionId) {
        let mut peer = transport.next_peer().await.unwrap();
        let id = ConnectionId::new_v4();
        peer.outbound
            .send(ServerFrame::Welcome { connection_id: id })
            .await
            .unwrap();
        match peer.inbound.recv().await.unwrap() {
            ClientFrame::Join { channel } => {
                peer.outbound
                    .send(ServerFrame::Joined { channel })
                    .await
                    .unwrap();
            }
            other => panic!("expected join, got {other:?}"),
        }
        (peer, id)
    }

    fn channel() -> ChannelKey {
        ChannelKey::for_user(&UserId::new("42"))
    }

    #[tokio::test]
    async fn connects_and_joins_user_channel() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (_peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;
        assert!(client.is_connected());
        assert_eq!(client.user_id(), Some(UserId::new("42")));
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        assert!(matches!(
            client.connect("42"),
            Err(SyncError::AlreadyConnected)
        ));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn retries_then_connects() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next(2);
        let client = client(transport.clone(), 5);

        client.connect("42").unwrap();
        let (_peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        assert_eq!(transport.open_count(), 3);
        assert_eq!(client.stats().failed_attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_end_disconnected() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next(3);
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        wait_for(&client, ConnectionState::Disconnected).await;
        assert_eq!(transport.open_count(), 3);

        // The task gave up, so a new connect is allowed
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.connect("42").unwrap();
        let (_peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;
    }

    #[tokio::test]
    async fn fatal_error_stops_retrying() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_fatal();
        let client = client(transport.clone(), 5);

        client.connect("42").unwrap();
        wait_for(&client, ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn join_rejection_disconnects() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 5);

        client.connect("42").unwrap();
        let mut peer = transport.next_peer().await.unwrap();
        peer.outbound
            .send(ServerFrame::Welcome {
                connection_id: ConnectionId::new_v4(),
            })
            .await
            .unwrap();
        assert!(matches!(
            peer.inbound.recv().await,
            Some(ClientFrame::Join { .. })
        ));
        peer.outbound
            .send(ServerFrame::Error {
                message: "channel full".into(),
            })
            .await
            .unwrap();

        wait_for(&client, ConnectionState::Disconnected).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn silent_peer_times_out_and_retries() {
        let transport = Arc::new(MockTransport::new());
        let config = fast_config(2).with_join_timeout(Duration::from_millis(30));
        let client =
            SyncChannelClient::new(Arc::new(CartStore::new()), transport.clone(), config);

        client.connect("42").unwrap();
        let _first = transport.next_peer().await.unwrap();
        let _second = transport.next_peer().await.unwrap();
        wait_for(&client, ConnectionState::Disconnected).await;
        assert_eq!(client.stats().failed_attempts, 2);
    }

    #[tokio::test]
    async fn publishes_local_mutations() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (mut peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        client
            .store()
            .add_item(CartItem::new(1, "Mug", Money::from_minor(1000)), 1);
        match peer.inbound.recv().await.unwrap() {
            ClientFrame::Publish { channel: c, event } => {
                assert_eq!(c, channel());
                assert_eq!(event.product_id(), Some(ProductId(1)));
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_mutations_are_published_after_join() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        client
            .store()
            .add_item(CartItem::new(1, "Mug", Money::from_minor(1000)), 1);
        let (mut peer, _) = accept(&transport).await;

        assert!(matches!(
            peer.inbound.recv().await.unwrap(),
            ClientFrame::Publish { .. }
        ));
    }

    #[tokio::test]
    async fn applies_remote_events_and_suppresses_echo() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (peer, own_id) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        let item = CartItem::new(5, "Lamp", Money::from_minor(300)).with_quantity(2);
        let mut snapshots = client.store().subscribe();

        peer.outbound
            .send(ServerFrame::Event(SequencedEvent {
                channel: channel(),
                sequence: 1,
                origin: own_id,
                event: MutationEvent::CartCleared,
            }))
            .await
            .unwrap();
        peer.outbound
            .send(ServerFrame::Event(SequencedEvent {
                channel: channel(),
                sequence: 2,
                origin: ConnectionId::new_v4(),
                event: MutationEvent::upserted(item),
            }))
            .await
            .unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|s| s.total_items == 2),
        )
        .await
        .unwrap()
        .unwrap();

        let stats = client.stats();
        assert_eq!(stats.echoes_suppressed, 1);
        assert_eq!(stats.events_applied, 1);
    }

    #[tokio::test]
    async fn lost_link_reconnects() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        drop(peer);
        let (_peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        assert_eq!(client.stats().reconnects, 1);
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_sends_leave() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (mut peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            peer.inbound.recv().await,
            Some(ClientFrame::Leave { channel: channel() })
        );
        assert!(peer.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_abandons_pending_join() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let _peer = transport.next_peer().await.unwrap();
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.user_id().is_none());
    }

    #[tokio::test]
    async fn outbox_survives_reconnect_cycle() {
        let transport = Arc::new(MockTransport::new());
        let client = client(transport.clone(), 3);

        client.connect("42").unwrap();
        let (_peer, _) = accept(&transport).await;
        wait_for(&client, ConnectionState::Connected).await;
        client.disconnect().await;

        client
            .store()
            .add_item(CartItem::new(1, "Mug", Money::from_minor(1000)), 1);

        client.connect("42").unwrap();
        let (mut peer, _) = accept(&transport).await;
        assert!(matches!(
            peer.inbound.recv().await.unwrap(),
            ClientFrame::Publish { .. }
        ));
    }
}

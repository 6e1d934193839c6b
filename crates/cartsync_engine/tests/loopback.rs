//! Sessions of the same user kept in step through a real coordinator.

use async_trait::async_trait;
use cartsync_engine::{
    CartPersistence, CartStore, ConnectionState, Link, RetryConfig, SyncChannelClient, SyncConfig,
    SyncResult, Transport, WebSocketTransport,
};
use cartsync_protocol::{Money, ProductId, UserId};
use cartsync_server::{serve_session, BroadcastCoordinator, CoordinatorServer, ServerConfig};
use cartsync_storage::{BlobStore, InMemoryBlobStore};
use cartsync_testkit::item;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Opens links straight into an in-process coordinator.
struct LoopbackTransport {
    coordinator: Arc<BroadcastCoordinator>,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

impl LoopbackTransport {
    fn new(coordinator: Arc<BroadcastCoordinator>) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Drops every open session on the coordinator side.
    fn sever(&self) {
        for session in self.sessions.lock().drain(..) {
            session.abort();
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self) -> SyncResult<Link> {
        let (link, remote) = Link::pair(64);
        let session = tokio::spawn(serve_session(
            self.coordinator.clone(),
            remote.inbound,
            remote.outbound,
        ));
        self.sessions.lock().push(session);
        Ok(link)
    }
}

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_retry(
            RetryConfig::new(20)
                .with_initial_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(50))
                .without_jitter(),
        )
        .with_join_timeout(Duration::from_secs(2))
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn connected(client: &SyncChannelClient) {
    let mut state = client.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("client did not connect")
    .unwrap();
}

struct Session {
    store: Arc<CartStore>,
    client: SyncChannelClient,
}

fn session(transport: Arc<dyn Transport>) -> Session {
    let store = Arc::new(CartStore::new());
    let client = SyncChannelClient::new(store.clone(), transport, config());
    Session { store, client }
}

#[tokio::test]
async fn two_sessions_converge() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator.clone());
    let a = session(transport.clone());
    let b = session(transport.clone());

    a.client.connect("42").unwrap();
    b.client.connect("42").unwrap();
    connected(&a.client).await;
    connected(&b.client).await;
    assert_eq!(coordinator.members(&UserId::new("42")).len(), 2);

    assert!(a.store.add_item(item(1, 1000, Some(5)), 2));
    eventually("upsert on b", || b.store.snapshot().total_items == 2).await;
    eventually("echo on a", || a.client.stats().echoes_suppressed == 1).await;

    assert!(b.store.update_quantity(ProductId(1), 9));
    eventually("clipped update on a", || {
        a.store.state().get(ProductId(1)).map(|i| i.quantity) == Some(5)
    })
    .await;

    assert!(a.store.add_item(item(2, 250, None), 1));
    assert!(b.store.remove_item(ProductId(1)));
    eventually("both agree", || {
        let (left, right) = (a.store.snapshot(), b.store.snapshot());
        left == right && left.items.len() == 1
    })
    .await;
    assert_eq!(a.store.snapshot().total_amount, Money::from_minor(250));

    a.client.disconnect().await;
    b.client.disconnect().await;
    eventually("channel emptied", || coordinator.stats().active_channels == 0).await;
}

#[tokio::test]
async fn other_users_are_not_disturbed() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator);
    let alice = session(transport.clone());
    let bob = session(transport.clone());

    alice.client.connect("alice").unwrap();
    bob.client.connect("bob").unwrap();
    connected(&alice.client).await;
    connected(&bob.client).await;

    alice.store.add_item(item(1, 100, None), 1);
    eventually("alice echo", || alice.client.stats().echoes_suppressed == 1).await;
    assert!(bob.store.snapshot().is_empty());
    assert_eq!(bob.client.stats().events_applied, 0);
}

#[tokio::test]
async fn count_sync_reaches_other_session() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator);
    let a = session(transport.clone());
    let b = session(transport.clone());
    a.client.connect("7").unwrap();
    b.client.connect("7").unwrap();
    connected(&a.client).await;
    connected(&b.client).await;

    a.store.add_item(item(1, 100, None), 3);
    eventually("upsert", || b.store.snapshot().total_items == 3).await;
    a.store.announce_count();
    eventually("count", || b.store.snapshot().synced_count == Some(3)).await;
}

#[tokio::test]
async fn offline_edits_flow_after_connect() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator);
    let a = session(transport.clone());
    let b = session(transport.clone());

    b.client.connect("42").unwrap();
    connected(&b.client).await;

    a.client.connect("42").unwrap();
    a.client.disconnect().await;
    a.store.add_item(item(3, 500, None), 4);

    a.client.connect("42").unwrap();
    connected(&a.client).await;
    eventually("replayed upsert", || b.store.snapshot().total_items == 4).await;
}

#[tokio::test]
async fn severed_link_reconnects_and_resumes() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator.clone());
    let a = session(transport.clone());
    let b = session(transport.clone());
    a.client.connect("42").unwrap();
    b.client.connect("42").unwrap();
    connected(&a.client).await;
    connected(&b.client).await;

    transport.sever();
    eventually("reconnects", || {
        a.client.stats().reconnects >= 1
            && b.client.stats().reconnects >= 1
            && a.client.is_connected()
            && b.client.is_connected()
            && coordinator.members(&UserId::new("42")).len() == 2
    })
    .await;

    a.store.add_item(item(1, 100, None), 1);
    eventually("upsert after reconnect", || b.store.snapshot().total_items == 1).await;
}

#[tokio::test]
async fn remote_changes_are_persisted() {
    let coordinator = Arc::new(BroadcastCoordinator::new(&ServerConfig::default()));
    let transport = LoopbackTransport::new(coordinator);
    let blobs = Arc::new(InMemoryBlobStore::new());
    let persisted = Arc::new(CartStore::open(CartPersistence::new(blobs.clone())));
    let b = SyncChannelClient::new(persisted.clone(), transport.clone(), config());
    let a = session(transport.clone());

    a.client.connect("42").unwrap();
    b.connect("42").unwrap();
    connected(&a.client).await;
    connected(&b).await;

    a.store.add_item(item(1, 1000, None), 2);
    eventually("saved", || blobs.read("cart").unwrap().is_some()).await;

    let reloaded = CartPersistence::new(blobs.clone()).load().unwrap();
    assert_eq!(reloaded.total_items(), 2);

    a.store.clear();
    eventually("blob deleted", || blobs.read("cart").unwrap().is_none()).await;
    assert!(persisted.snapshot().is_empty());
}

#[tokio::test]
async fn sessions_sync_over_websocket() {
    let server = Arc::new(CoordinatorServer::new(ServerConfig::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let running = server.clone();
    let token = shutdown.clone();
    let serving = tokio::spawn(async move { running.serve(listener, token).await });

    let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::new(format!("ws://{addr}")));
    let a = session(transport.clone());
    let b = session(transport);
    a.client.connect("42").unwrap();
    b.client.connect("42").unwrap();
    connected(&a.client).await;
    connected(&b.client).await;

    a.store.add_item(item(1, 1000, Some(5)), 2);
    b.store.add_item(item(2, 300, None), 1);
    eventually("convergence", || {
        let (left, right) = (a.store.snapshot(), b.store.snapshot());
        left == right && left.total_items == 3
    })
    .await;
    assert_eq!(a.store.snapshot().total_amount, Money::from_minor(2300));

    a.client.disconnect().await;
    b.client.disconnect().await;
    shutdown.cancel();
    serving.await.unwrap().unwrap();
}

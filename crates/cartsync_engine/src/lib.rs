//! # cartsync Engine
//!
//! Client side of multi-session cart synchronization.
//!
//! This crate provides:
//! - [`CartStore`] - the single update path for one user's cart
//! - [`CartPersistence`] - durable save/restore of the cart as a JSON blob
//! - [`reconcile::apply`] - pure application of remote mutation events
//! - [`SyncChannelClient`] - the connection to the broadcast coordinator
//! - [`Transport`] implementations: [`WebSocketTransport`] and
//!   [`MockTransport`]
//!
//! ## Data Flow
//!
//! A local mutation updates the store, recomputes totals, persists the
//! cart, then offers a [`MutationEvent`](cartsync_protocol::MutationEvent)
//! to the outbox. The client publishes outbox events to the user's channel.
//! Events from the user's other sessions come back through the coordinator
//! and are reconciled into the store without being re-emitted.
//!
//! ## Key Invariants
//!
//! - Totals are always derived from items, under the same lock
//! - Local mutations never wait on the network
//! - A session never applies its own echoed events
//! - Sync and persistence failures never fail a cart operation
//!
//! ## Example
//!
//! ```rust
//! use cartsync_engine::{CartPersistence, CartStore};
//! use cartsync_protocol::{CartItem, Money, ProductId};
//! use cartsync_storage::InMemoryBlobStore;
//! use std::sync::Arc;
//!
//! let store = CartStore::open(CartPersistence::new(Arc::new(InMemoryBlobStore::new())));
//! store.add_item(CartItem::new(1, "Mug", Money::from_minor(1000)).with_max_quantity(5), 1);
//! store.update_quantity(ProductId(1), 9999);
//!
//! let snapshot = store.snapshot();
//! assert_eq!(snapshot.total_items, 5);
//! assert_eq!(snapshot.total_amount, Money::from_minor(5000));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod error;
mod persistence;
pub mod reconcile;
mod state;
mod store;
mod transport;
mod websocket;

pub use client::{ConnectionState, SyncChannelClient, SyncStats};
pub use config::{RetryConfig, SyncConfig, DEFAULT_BLOB_KEY, DEFAULT_BLOB_TTL};
pub use error::{PersistenceError, PersistenceResult, SyncError, SyncResult};
pub use persistence::{CartPersistence, PersistedCartBlob, CURRENT_SCHEMA_VERSION};
pub use state::{CartSnapshot, CartState};
pub use store::CartStore;
pub use transport::{Link, MockTransport, RemoteEnd, Transport};
pub use websocket::WebSocketTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

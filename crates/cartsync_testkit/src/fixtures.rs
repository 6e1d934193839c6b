//! Test fixtures.

use cartsync_protocol::{
    CartItem, ChannelKey, ConnectionId, Money, MutationEvent, SequencedEvent, UserId,
};
use cartsync_storage::FileBlobStore;
use std::sync::Arc;
use tempfile::TempDir;

/// Builds an item with quantity 1.
///
/// `max` of `None` leaves the quantity unbounded.
pub fn item(product_id: u64, price_minor: u64, max: Option<u32>) -> CartItem {
    let item = CartItem::new(
        product_id,
        format!("Product {product_id}"),
        Money::from_minor(price_minor),
    );
    match max {
        Some(max) => item.with_max_quantity(max),
        None => item,
    }
}

/// Wraps an event as if the coordinator broadcast it from `origin`.
pub fn envelope(user: &str, sequence: u64, origin: ConnectionId, event: MutationEvent) -> SequencedEvent {
    SequencedEvent {
        channel: ChannelKey::for_user(&UserId::new(user)),
        sequence,
        origin,
        event,
    }
}

/// A file blob store in a temporary directory, removed on drop.
pub struct TempBlobStore {
    /// The store.
    pub store: Arc<FileBlobStore>,
    _dir: TempDir,
}

impl TempBlobStore {
    /// Creates a store in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileBlobStore::open(dir.path()).expect("Failed to open blob store");
        Self {
            store: Arc::new(store),
            _dir: dir,
        }
    }
}

impl Default for TempBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

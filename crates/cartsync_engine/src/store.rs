//! The cart state store.
//!
//! All changes to a cart, local or remote, run through one mutex. Inside it
//! the order is always: mutate, persist, emit to the outbox, notify
//! subscribers. Readers therefore never see items and totals out of step,
//! and a persisted blob never lags the state a subscriber was shown.

use crate::persistence::CartPersistence;
use crate::reconcile;
use crate::state::{CartSnapshot, CartState};
use cartsync_protocol::{CartItem, MutationEvent, ProductId, SequencedEvent};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

struct Inner {
    state: CartState,
    outbox: Option<mpsc::Sender<MutationEvent>>,
}

/// How a change reaches the blob store.
enum Persist {
    Save,
    Delete,
    Skip,
}

/// Owns one user's cart for one client session.
pub struct CartStore {
    inner: Mutex<Inner>,
    persistence: Option<CartPersistence>,
    notify: watch::Sender<CartSnapshot>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Creates an empty store that persists nothing.
    pub fn new() -> Self {
        Self::from_state(CartState::new(), None)
    }

    /// Creates a store backed by `persistence`, restoring a saved cart if a
    /// valid one exists.
    pub fn open(persistence: CartPersistence) -> Self {
        let state = persistence.load().unwrap_or_default();
        debug!(items = state.len(), "cart store opened");
        Self::from_state(state, Some(persistence))
    }

    fn from_state(state: CartState, persistence: Option<CartPersistence>) -> Self {
        let (notify, _) = watch::channel(state.snapshot());
        Self {
            inner: Mutex::new(Inner {
                state,
                outbox: None,
            }),
            persistence,
            notify,
        }
    }

    /// Routes locally originated events into a new bounded outbox.
    ///
    /// Replaces any previously attached outbox. Events are offered without
    /// blocking; when the outbox is full the event is dropped.
    pub fn attach_outbox(&self, capacity: usize) -> mpsc::Receiver<MutationEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.inner.lock().outbox = Some(tx);
        rx
    }

    /// Stops emitting events.
    pub fn detach_outbox(&self) {
        self.inner.lock().outbox = None;
    }

    /// Adds `quantity` units of a product.
    ///
    /// If the product is already present this behaves like
    /// [`update_quantity`](Self::update_quantity) with the summed quantity;
    /// otherwise the item is inserted with the quantity clipped into
    /// `[1, max_quantity]`. Returns true if the cart changed.
    pub fn add_item(&self, item: CartItem, quantity: u32) -> bool {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.state.get(item.product_id) {
            let target = existing.quantity.saturating_add(quantity);
            return self.set_quantity_locked(&mut inner, item.product_id, target);
        }

        let mut item = item;
        item.quantity = item.clamp_quantity(quantity);
        debug!(product_id = %item.product_id, quantity = item.quantity, "item added");
        inner.state.upsert(item.clone());
        self.commit(&mut inner, Persist::Save, Some(MutationEvent::upserted(item)));
        true
    }

    /// Sets a product's quantity.
    ///
    /// A quantity below 1 is rejected; one above `max_quantity` is clipped
    /// to it. Absent products and unchanged quantities are no-ops. Returns
    /// true if the cart changed.
    pub fn update_quantity(&self, product_id: ProductId, quantity: u32) -> bool {
        let mut inner = self.inner.lock();
        self.set_quantity_locked(&mut inner, product_id, quantity)
    }

    fn set_quantity_locked(&self, inner: &mut Inner, product_id: ProductId, quantity: u32) -> bool {
        if quantity < 1 {
            debug!(%product_id, "rejecting quantity below 1");
            return false;
        }
        let Some(item) = inner.state.get_mut(product_id) else {
            return false;
        };
        let quantity = item.clamp_quantity(quantity);
        if quantity == item.quantity {
            return false;
        }
        item.quantity = quantity;
        let event = MutationEvent::upserted(item.clone());
        debug!(%product_id, quantity, "quantity updated");
        self.commit(inner, Persist::Save, Some(event));
        true
    }

    /// Removes a product. Returns true if it was present.
    pub fn remove_item(&self, product_id: ProductId) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.remove(product_id).is_none() {
            return false;
        }
        debug!(%product_id, "item removed");
        self.commit(
            &mut inner,
            Persist::Save,
            Some(MutationEvent::removed(product_id)),
        );
        true
    }

    /// Empties the cart and deletes its saved blob.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.state.clear_items();
        debug!("cart cleared");
        self.commit(&mut inner, Persist::Delete, Some(MutationEvent::CartCleared));
    }

    /// Tells other sessions how many units this cart holds.
    pub fn announce_count(&self) {
        let mut inner = self.inner.lock();
        let count = inner.state.total_items();
        self.commit(
            &mut inner,
            Persist::Skip,
            Some(MutationEvent::CountSync { count }),
        );
    }

    /// Applies an event broadcast by another session.
    ///
    /// Nothing is emitted to the outbox. Returns true if the cart changed.
    pub fn apply_remote(&self, envelope: &SequencedEvent) -> bool {
        let mut inner = self.inner.lock();
        let next = reconcile::apply(&inner.state, &envelope.event);
        if next == inner.state {
            return false;
        }

        let persist = if next.same_items(&inner.state) {
            Persist::Skip
        } else if next.is_empty() {
            Persist::Delete
        } else {
            Persist::Save
        };
        debug!(
            sequence = envelope.sequence,
            kind = envelope.event.kind(),
            "remote event applied"
        );
        inner.state = next;
        self.commit(&mut inner, persist, None);
        true
    }

    /// Returns the current cart.
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.lock().state.snapshot()
    }

    /// Returns a copy of the underlying state.
    pub fn state(&self) -> CartState {
        self.inner.lock().state.clone()
    }

    /// Subscribes to snapshots published after every change.
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.notify.subscribe()
    }

    fn commit(&self, inner: &mut Inner, persist: Persist, event: Option<MutationEvent>) {
        if let Some(persistence) = &self.persistence {
            let result = match persist {
                Persist::Save => persistence.save(&inner.state),
                Persist::Delete => persistence.clear(),
                Persist::Skip => Ok(()),
            };
            if let Err(e) = result {
                warn!(error = %e, "failed to persist cart");
            }
        }

        if let (Some(event), Some(outbox)) = (event, &inner.outbox) {
            match outbox.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(kind = event.kind(), "outbox full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("outbox closed, detaching");
                    inner.outbox = None;
                }
            }
        }

        self.notify.send_replace(inner.state.snapshot());
    }
}

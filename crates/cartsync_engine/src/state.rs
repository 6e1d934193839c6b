//! Cart state and the read-only snapshot handed to UI layers.

use cartsync_protocol::{CartItem, Money, ProductId};
use serde::Serialize;
use std::collections::BTreeMap;

/// The set of items in one user's cart.
///
/// Totals are derived from the items on every call; they are never stored.
/// `synced_count` is the advisory badge count last announced by another
/// session and is independent of the items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    items: BTreeMap<ProductId, CartItem>,
    synced_count: Option<u32>,
}

impl CartState {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cart from items. A later item replaces an earlier one with
    /// the same product.
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.product_id, item))
                .collect(),
            synced_count: None,
        }
    }

    /// Returns the item for a product.
    pub fn get(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.get(&product_id)
    }

    /// Returns true if the product is in the cart.
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.items.contains_key(&product_id)
    }

    /// Iterates over the items in product order.
    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    /// Returns the number of distinct products.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the cart has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of `unit_price * quantity` over all items.
    pub fn total_amount(&self) -> Money {
        self.items.values().map(CartItem::line_total).sum()
    }

    /// Sum of quantities over all items.
    pub fn total_items(&self) -> u32 {
        self.items
            .values()
            .fold(0u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Last count announced by another session, if any.
    pub fn synced_count(&self) -> Option<u32> {
        self.synced_count
    }

    /// Returns a consistent read-only view.
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.values().cloned().collect(),
            total_amount: self.total_amount(),
            total_items: self.total_items(),
            synced_count: self.synced_count,
        }
    }

    pub(crate) fn upsert(&mut self, item: CartItem) {
        self.items.insert(item.product_id, item);
    }

    pub(crate) fn get_mut(&mut self, product_id: ProductId) -> Option<&mut CartItem> {
        self.items.get_mut(&product_id)
    }

    pub(crate) fn remove(&mut self, product_id: ProductId) -> Option<CartItem> {
        self.items.remove(&product_id)
    }

    pub(crate) fn clear_items(&mut self) {
        self.items.clear();
    }

    pub(crate) fn set_synced_count(&mut self, count: u32) {
        self.synced_count = Some(count);
    }

    /// Returns true if both carts hold the same items.
    pub(crate) fn same_items(&self, other: &CartState) -> bool {
        self.items == other.items
    }
}

/// Read-only view of a cart at one instant.
///
/// Items, totals and the synced count were all read under the same lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Items in product order.
    pub items: Vec<CartItem>,
    /// Sum of line totals.
    pub total_amount: Money,
    /// Sum of quantities.
    pub total_items: u32,
    /// Advisory count from another session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_count: Option<u32>,
}

impl CartSnapshot {
    /// Returns true if the cart was empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random carts and cart operations
//! that maintain the item invariants.

use cartsync_protocol::{CartItem, Money, MutationEvent, ProductId};
use proptest::prelude::*;

/// Product IDs are drawn from a small range so operations collide.
pub const PRODUCT_RANGE: u64 = 8;

/// Strategy for product IDs within [`PRODUCT_RANGE`].
pub fn product_id_strategy() -> impl Strategy<Value = ProductId> {
    (0..PRODUCT_RANGE).prop_map(ProductId)
}

/// Strategy for valid items (`1 <= quantity <= max_quantity`).
pub fn cart_item_strategy() -> impl Strategy<Value = CartItem> {
    (
        product_id_strategy(),
        1u64..100_000,
        prop::option::of(1u32..20),
        1u32..20,
        prop::option::of("[SMLX]{1,2}"),
    )
        .prop_map(|(product_id, price, max, quantity, size)| {
            let mut item = CartItem::new(product_id, format!("Product {product_id}"), Money::from_minor(price));
            if let Some(max) = max {
                item = item.with_max_quantity(max);
            }
            if let Some(size) = size {
                item = item.with_size(size);
            }
            let quantity = item.clamp_quantity(quantity);
            item.with_quantity(quantity)
        })
}

/// Strategy for up to `max` valid items with distinct products.
///
/// Product IDs are spread over a wider range so large carts are possible.
pub fn cart_items_strategy(max: usize) -> impl Strategy<Value = Vec<CartItem>> {
    prop::collection::btree_map(0u64..10_000, cart_item_strategy(), 0..=max).prop_map(|items| {
        items
            .into_iter()
            .map(|(product_id, mut item)| {
                item.product_id = ProductId(product_id);
                item
            })
            .collect()
    })
}

/// A local cart operation.
#[derive(Debug, Clone)]
pub enum CartOp {
    /// Add units of an item.
    Add {
        /// Item to add.
        item: CartItem,
        /// Units requested.
        quantity: u32,
    },
    /// Set a product's quantity, possibly out of range.
    Update {
        /// Product.
        product_id: ProductId,
        /// Requested quantity.
        quantity: u32,
    },
    /// Remove a product.
    Remove {
        /// Product.
        product_id: ProductId,
    },
    /// Empty the cart.
    Clear,
}

/// Strategy for local cart operations, weighted toward adds and updates.
pub fn cart_op_strategy() -> impl Strategy<Value = CartOp> {
    prop_oneof![
        4 => (cart_item_strategy(), 0u32..30).prop_map(|(item, quantity)| CartOp::Add { item, quantity }),
        3 => (product_id_strategy(), 0u32..30).prop_map(|(product_id, quantity)| CartOp::Update { product_id, quantity }),
        2 => product_id_strategy().prop_map(|product_id| CartOp::Remove { product_id }),
        1 => Just(CartOp::Clear),
    ]
}

/// Strategy for mutation events as another session would send them.
pub fn mutation_event_strategy() -> impl Strategy<Value = MutationEvent> {
    prop_oneof![
        4 => cart_item_strategy().prop_map(MutationEvent::upserted),
        2 => product_id_strategy().prop_map(MutationEvent::removed),
        1 => Just(MutationEvent::CartCleared),
        1 => (0u32..100).prop_map(|count| MutationEvent::CountSync { count }),
        1 => Just(MutationEvent::Unknown),
    ]
}

//! Benchmark utilities.

use cartsync_engine::CartState;
use cartsync_protocol::{CartItem, Money, MutationEvent};
use rand::Rng;

/// Generate `count` items with distinct products and random prices.
pub fn random_items(count: usize) -> Vec<CartItem> {
    let mut rng = rand::thread_rng();
    (0..count as u64)
        .map(|id| {
            CartItem::new(id, format!("Product {id}"), Money::from_minor(rng.gen_range(100..100_000)))
                .with_max_quantity(10)
                .with_quantity(rng.gen_range(1..=10))
        })
        .collect()
}

/// Generate a cart of `count` items.
pub fn cart(count: usize) -> CartState {
    CartState::from_items(random_items(count))
}

/// Generate a mixed stream of events touching products below `range`.
pub fn random_events(count: usize, range: u64) -> Vec<MutationEvent> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let product = rng.gen_range(0..range.max(1));
            if rng.gen_bool(0.8) {
                MutationEvent::upserted(
                    CartItem::new(product, "Product", Money::from_minor(500))
                        .with_quantity(rng.gen_range(1..=5)),
                )
            } else {
                MutationEvent::removed(product.into())
            }
        })
        .collect()
}

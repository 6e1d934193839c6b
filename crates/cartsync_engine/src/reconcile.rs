//! Applying remote mutation events to a cart.
//!
//! Conflicts resolve last-writer-wins by arrival order: the coordinator's
//! per-channel sequence fixes the order, and every event is applied
//! verbatim in that order.

use crate::state::CartState;
use cartsync_protocol::MutationEvent;
use tracing::debug;

/// Returns the cart that results from applying `event` to `state`.
///
/// - `ItemUpserted` inserts or overwrites the line with the carried item.
/// - `ItemRemoved` deletes the line if present.
/// - `CartCleared` empties the items; the advisory count is kept.
/// - `CountSync` only records the advisory count.
/// - `Unknown` leaves the cart unchanged.
///
/// An upsert whose envelope and item disagree on the product, or whose item
/// breaks the quantity invariant, is ignored.
pub fn apply(state: &CartState, event: &MutationEvent) -> CartState {
    let mut next = state.clone();
    match event {
        MutationEvent::ItemUpserted { product_id, item } => {
            if item.product_id != *product_id {
                debug!(%product_id, item_product = %item.product_id, "ignoring upsert with mismatched product");
            } else if !item.is_valid() {
                debug!(%product_id, quantity = item.quantity, "ignoring upsert with invalid quantity");
            } else {
                next.upsert(item.clone());
            }
        }
        MutationEvent::ItemRemoved { product_id } => {
            next.remove(*product_id);
        }
        MutationEvent::CartCleared => next.clear_items(),
        MutationEvent::CountSync { count } => next.set_synced_count(*count),
        MutationEvent::Unknown => {
            debug!("ignoring mutation event of unknown kind");
        }
    }
    next
}

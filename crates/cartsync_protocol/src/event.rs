//! Cart mutation events.

use crate::ids::{ChannelKey, ConnectionId, ProductId};
use crate::item::CartItem;
use serde::{Deserialize, Serialize};

/// A discrete cart change exchanged between sessions of the same user.
///
/// The set of kinds is closed. Anything carrying an unrecognised `kind` tag
/// decodes to [`MutationEvent::Unknown`] so newer peers can introduce kinds
/// without breaking older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum MutationEvent {
    /// An item was inserted or its line replaced.
    ItemUpserted {
        /// Product key.
        product_id: ProductId,
        /// Full line after the change.
        item: CartItem,
    },
    /// An item was removed.
    ItemRemoved {
        /// Product key.
        product_id: ProductId,
    },
    /// The whole cart was emptied.
    CartCleared,
    /// Advisory item count for badge displays.
    CountSync {
        /// Total units in the sender's cart.
        count: u32,
    },
    /// A kind this build does not understand.
    #[serde(other)]
    Unknown,
}

impl MutationEvent {
    /// Builds an upsert carrying the full item.
    pub fn upserted(item: CartItem) -> Self {
        Self::ItemUpserted {
            product_id: item.product_id,
            item,
        }
    }

    /// Builds a removal.
    pub fn removed(product_id: ProductId) -> Self {
        Self::ItemRemoved { product_id }
    }

    /// Returns the wire name of this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ItemUpserted { .. } => "ItemUpserted",
            Self::ItemRemoved { .. } => "ItemRemoved",
            Self::CartCleared => "CartCleared",
            Self::CountSync { .. } => "CountSync",
            Self::Unknown => "Unknown",
        }
    }

    /// Returns the product this event touches, if any.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::ItemUpserted { product_id, .. } | Self::ItemRemoved { product_id } => {
                Some(*product_id)
            }
            Self::CartCleared | Self::CountSync { .. } | Self::Unknown => None,
        }
    }
}

/// A mutation event as delivered by the coordinator.
///
/// `sequence` increases monotonically per channel and is assigned at
/// broadcast time; `origin` is the connection that published the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Channel the event was broadcast on.
    pub channel: ChannelKey,
    /// Per-channel sequence number.
    pub sequence: u64,
    /// Publishing connection.
    pub origin: ConnectionId,
    /// The change itself.
    pub event: MutationEvent,
}

impl SequencedEvent {
    /// Returns true if `connection` published this event.
    pub fn is_from(&self, connection: ConnectionId) -> bool {
        self.origin == connection
    }
}

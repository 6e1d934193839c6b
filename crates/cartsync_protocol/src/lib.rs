//! # cartsync Protocol
//!
//! Shared data model and wire protocol for cartsync.
//!
//! This crate provides:
//! - Identifiers (`ProductId`, `UserId`, `ConnectionId`, `ChannelKey`)
//! - `CartItem` and `Money`
//! - `MutationEvent`, the closed set of cart changes exchanged between sessions
//! - `SequencedEvent`, the envelope the coordinator stamps on every broadcast
//! - Client/server frames and their CBOR codec
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Channel keys
//!
//! Every user owns exactly one broadcast channel, keyed `"cart_" + userId`:
//!
//! ```rust
//! use cartsync_protocol::{ChannelKey, UserId};
//!
//! let key = ChannelKey::for_user(&UserId::new("42"));
//! assert_eq!(key.as_str(), "cart_42");
//! assert_eq!(key.user_id(), UserId::new("42"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod frame;
mod ids;
mod item;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{MutationEvent, SequencedEvent};
pub use frame::{from_cbor, to_cbor, ClientFrame, ServerFrame};
pub use ids::{ChannelKey, ConnectionId, ProductId, UserId, CHANNEL_PREFIX};
pub use item::{CartItem, Money};

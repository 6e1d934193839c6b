//! # cartsync Server
//!
//! Broadcast coordinator for multi-session cart sync.
//!
//! This crate provides:
//! - [`BroadcastCoordinator`] - channel membership and per-channel fan-out
//! - [`serve_session`] - the transport-independent per-connection loop
//! - [`CoordinatorServer`] - WebSocket accept loop around both
//!
//! # Architecture
//!
//! Every user has one channel, keyed `cart_<userId>`. Each client session
//! joins its user's channel and publishes mutation events to it; the
//! coordinator stamps each event with the channel's next sequence number
//! and delivers it to every member, the publisher included. Clients drop
//! their own echoes.
//!
//! The coordinator stores no cart contents. A lost delivery is dropped,
//! not retried: each client's durable local cart is the recovery path.
//!
//! # Protocol
//!
//! 1. Server sends `welcome` with the connection's ID
//! 2. Client sends `join` for its user's channel; server answers `joined`
//! 3. Client sends `publish`; every member receives an `event`
//! 4. Client sends `leave` or closes the connection

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod coordinator;
mod error;
mod server;
mod session;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use coordinator::{BroadcastCoordinator, CoordinatorStats};
pub use error::{ServerError, ServerResult};
pub use server::CoordinatorServer;
pub use session::serve_session;

//! # cartsync Testkit
//!
//! Test utilities for cartsync.
//!
//! This crate provides:
//! - Item fixtures and temporary blob stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use cartsync_testkit::prelude::*;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn items_are_valid(item in cart_item_strategy()) {
//!         prop_assert!(item.is_valid());
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

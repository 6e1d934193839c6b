//! # cartsync Storage
//!
//! Key-addressed blob stores used to persist carts between sessions.
//!
//! Stores are **opaque byte stores** - they do not interpret the blobs they
//! hold. Schema, versioning and expiry belong to the engine.
//!
//! ## Available Stores
//!
//! - [`InMemoryBlobStore`] - For testing and ephemeral sessions
//! - [`FileBlobStore`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use cartsync_storage::{BlobStore, InMemoryBlobStore};
//!
//! let store = InMemoryBlobStore::new();
//! store.write("cart", b"{}").unwrap();
//! assert_eq!(store.read("cart").unwrap().as_deref(), Some(&b"{}"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::InMemoryBlobStore;
pub use store::{validate_key, BlobStore, MAX_KEY_LEN};

//! Durable cart persistence.
//!
//! A cart is stored as one JSON blob under a fixed key:
//!
//! ```json
//! {"version":1,"items":[...],"totalAmount":2750,"totalItems":5,"expiresAt":1767225600000}
//! ```
//!
//! A blob that is unreadable, unparsable, from another schema version,
//! inconsistent, or expired is discarded rather than repaired.

use crate::config::{DEFAULT_BLOB_KEY, DEFAULT_BLOB_TTL};
use crate::error::{PersistenceError, PersistenceResult};
use crate::state::CartState;
use cartsync_protocol::{CartItem, Money};
use cartsync_storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// On-disk form of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCartBlob {
    /// Schema version.
    pub version: u32,
    /// Items in product order.
    pub items: Vec<CartItem>,
    /// Sum of line totals when written.
    pub total_amount: Money,
    /// Sum of quantities when written.
    pub total_items: u32,
    /// Expiry, milliseconds since the Unix epoch.
    pub expires_at: u64,
}

impl PersistedCartBlob {
    /// Builds a blob for `state` that expires at `expires_at`.
    pub fn from_state(state: &CartState, expires_at: u64) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            items: state.items().cloned().collect(),
            total_amount: state.total_amount(),
            total_items: state.total_items(),
            expires_at,
        }
    }

    /// Serializes to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Json`] if serialization fails.
    pub fn to_bytes(&self) -> PersistenceResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses JSON bytes without validating them.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Json`] if the bytes are not a blob.
    pub fn from_bytes(bytes: &[u8]) -> PersistenceResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Checks version, expiry and invariants, then rebuilds the cart.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn into_state(self, now_ms: u64) -> PersistenceResult<CartState> {
        if self.version != CURRENT_SCHEMA_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: CURRENT_SCHEMA_VERSION,
                found: self.version,
            });
        }
        if self.expires_at <= now_ms {
            return Err(PersistenceError::Expired {
                expires_at: self.expires_at,
                now: now_ms,
            });
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.product_id) {
                return Err(PersistenceError::Invalid(format!(
                    "duplicate product {}",
                    item.product_id
                )));
            }
            if !item.is_valid() {
                return Err(PersistenceError::Invalid(format!(
                    "product {} has quantity {} outside its bounds",
                    item.product_id, item.quantity
                )));
            }
        }

        let state = CartState::from_items(self.items);
        if state.total_amount() != self.total_amount || state.total_items() != self.total_items {
            return Err(PersistenceError::Invalid(format!(
                "stored totals {}/{} do not match items {}/{}",
                self.total_amount,
                self.total_items,
                state.total_amount(),
                state.total_items()
            )));
        }
        Ok(state)
    }
}

/// Saves and restores one cart through a [`BlobStore`].
#[derive(Clone)]
pub struct CartPersistence {
    store: Arc<dyn BlobStore>,
    key: String,
    ttl: Duration,
}

impl std::fmt::Debug for CartPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartPersistence")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CartPersistence {
    /// Creates a persistence layer using the default key and lifetime.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            key: DEFAULT_BLOB_KEY.to_string(),
            ttl: DEFAULT_BLOB_TTL,
        }
    }

    /// Sets the blob key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the lifetime of saved carts.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the blob key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes `state`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store fails.
    pub fn save(&self, state: &CartState) -> PersistenceResult<()> {
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let blob = PersistedCartBlob::from_state(state, now_millis().saturating_add(ttl_ms));
        self.store.write(&self.key, &blob.to_bytes()?)?;
        debug!(key = %self.key, items = blob.items.len(), "cart saved");
        Ok(())
    }

    /// Restores the saved cart, or `None` if there is no usable one.
    ///
    /// Never fails: problems are logged and an invalid blob is deleted.
    pub fn load(&self) -> Option<CartState> {
        match self.try_load() {
            Ok(state) => state,
            Err(PersistenceError::Storage(e)) => {
                warn!(key = %self.key, error = %e, "cart blob unreadable");
                None
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "discarding cart blob");
                if let Err(e) = self.clear() {
                    warn!(key = %self.key, error = %e, "failed to delete discarded cart blob");
                }
                None
            }
        }
    }

    /// Restores the saved cart, reporting why a blob was rejected.
    ///
    /// Unlike [`load`](Self::load) this leaves a rejected blob in place.
    ///
    /// # Errors
    ///
    /// Returns the read, parse or validation failure.
    pub fn try_load(&self) -> PersistenceResult<Option<CartState>> {
        let Some(bytes) = self.store.read(&self.key)? else {
            return Ok(None);
        };
        let state = PersistedCartBlob::from_bytes(&bytes)?.into_state(now_millis())?;
        Ok(Some(state))
    }

    /// Deletes the saved cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn clear(&self) -> PersistenceResult<()> {
        self.store.delete(&self.key)?;
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

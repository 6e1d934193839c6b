//! Blob store trait definition.

use crate::error::{StorageError, StorageResult};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 128;

/// A key-addressed store of opaque byte blobs.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write`
/// - `write` replaces the whole blob; readers never see a partial write
/// - `delete` of an absent key succeeds
/// - Stores must be `Send + Sync` so one store can back several carts
///
/// # Implementors
///
/// - [`super::InMemoryBlobStore`] - For testing
/// - [`super::FileBlobStore`] - For persistent storage
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `data` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn write(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Checks that a key is usable by every store.
///
/// Keys are 1 to [`MAX_KEY_LEN`] bytes of ASCII alphanumerics, `-`, `_`
/// and `.`, and may not start with `.`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] otherwise.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let well_formed = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

    if well_formed {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_accepts_plain_names() {
        assert!(validate_key("cart").is_ok());
        assert!(validate_key("cart_42.v1").is_ok());
        assert!(validate_key("user-7").is_ok());
    }

    #[test]
    fn key_rejects_paths_and_empties() {
        for key in ["", ".hidden", "../escape", "a/b", "a\\b", "sp ace", "ü"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn key_rejects_overlong() {
        let key = "k".repeat(MAX_KEY_LEN + 1);
        assert!(validate_key(&key).is_err());
        assert!(validate_key(&key[..MAX_KEY_LEN]).is_ok());
    }
}

//! Error types for the cart engine.

use cartsync_protocol::ProtocolError;
use cartsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync channel operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the sync channel client and its transports.
///
/// These never reach cart mutations; they surface through
/// [`crate::ConnectionState`] and the logs.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The peer sent something that does not fit the frame protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The coordinator refused to add this connection to the channel.
    #[error("join rejected: {0}")]
    JoinRejected(String),

    /// The handshake did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// `connect` was called while a connection task is still running.
    #[error("already connected or connecting")]
    AlreadyConnected,

    /// The connection task was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Reasons a cart could not be saved or restored.
///
/// A load failure is always recovered by discarding the blob and starting
/// from an empty cart.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The blob store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The blob is not valid JSON for the expected schema.
    #[error("malformed cart blob: {0}")]
    Json(#[from] serde_json::Error),

    /// The blob was written by an incompatible schema version.
    #[error("cart blob version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this build reads and writes.
        expected: u32,
        /// Version found in the blob.
        found: u32,
    },

    /// The blob outlived its expiry.
    #[error("cart blob expired at {expires_at} (now {now})")]
    Expired {
        /// Expiry timestamp, milliseconds since the Unix epoch.
        expires_at: u64,
        /// Load time, milliseconds since the Unix epoch.
        now: u64,
    },

    /// The blob parsed but violates a cart invariant.
    #[error("invalid cart blob: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad url").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::JoinRejected("channel full".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SyncError = ProtocolError::Decode("eof".into()).into();
        assert!(matches!(err, SyncError::Protocol(ref m) if m.contains("eof")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::AlreadyConnected;
        assert_eq!(err.to_string(), "already connected or connecting");

        let err = PersistenceError::VersionMismatch {
            expected: 1,
            found: 2,
        };
        assert!(err.to_string().contains("expected 1"));
        assert!(err.to_string().contains("found 2"));
    }
}

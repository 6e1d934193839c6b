//! Error types for the cartsync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// A frame could not be deserialized.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// A channel key does not follow the `cart_<userId>` shape.
    #[error("invalid channel key: {0:?}")]
    InvalidChannelKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidChannelKey("room_1".into());
        assert_eq!(err.to_string(), "invalid channel key: \"room_1\"");

        let err = ProtocolError::Decode("unexpected end".into());
        assert!(err.to_string().contains("unexpected end"));
    }
}

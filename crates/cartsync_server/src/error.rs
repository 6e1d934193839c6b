//! Error types for the coordinator server.

use cartsync_protocol::{ConnectionId, ProtocolError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the coordinator server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing error.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection is not registered with the coordinator.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The channel already has the maximum number of members.
    #[error("channel {channel} is full ({max} members)")]
    ChannelFull {
        /// Channel key.
        channel: String,
        /// Member limit.
        max: usize,
    },

    /// The connection may not use this channel.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}

impl From<tungstenite::Error> for ServerError {
    fn from(err: tungstenite::Error) -> Self {
        ServerError::WebSocket(Box::new(err))
    }
}

impl ServerError {
    /// Returns true if the client caused this error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Protocol(_)
                | ServerError::UnknownConnection(_)
                | ServerError::ChannelFull { .. }
                | ServerError::InvalidChannel(_)
        )
    }
}

/// Why one delivery to one connection did not happen.
///
/// Failed deliveries are dropped, never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryFailure {
    /// The connection's queue is full.
    #[error("delivery queue full")]
    QueueFull,
    /// The connection is gone.
    #[error("connection gone")]
    Disconnected,
}

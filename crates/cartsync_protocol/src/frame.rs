//! Wire frames and their CBOR codec.
//!
//! One frame travels per transport message (a WebSocket binary message, or
//! one channel send for in-process links). Frames are internally tagged by
//! `type`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::{MutationEvent, SequencedEvent};
use crate::ids::{ChannelKey, ConnectionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Frames sent by a client connection to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a user's channel.
    Join {
        /// Channel to join.
        channel: ChannelKey,
    },
    /// Leave a user's channel.
    Leave {
        /// Channel to leave.
        channel: ChannelKey,
    },
    /// Broadcast a mutation to the channel.
    Publish {
        /// Target channel (must be joined).
        channel: ChannelKey,
        /// The mutation.
        event: MutationEvent,
    },
    /// Liveness probe.
    Ping,
}

/// Frames sent by the coordinator to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection; carries the assigned ID.
    Welcome {
        /// ID the coordinator stamps on this connection's broadcasts.
        connection_id: ConnectionId,
    },
    /// Join acknowledged.
    Joined {
        /// Joined channel.
        channel: ChannelKey,
    },
    /// Leave acknowledged.
    Left {
        /// Left channel.
        channel: ChannelKey,
    },
    /// A broadcast mutation.
    Event(SequencedEvent),
    /// A request was rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Reply to [`ClientFrame::Ping`].
    Pong,
}

impl ClientFrame {
    /// Serializes to the binary wire format.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Deserializes from the binary wire format.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

impl ServerFrame {
    /// Serializes to the binary wire format.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Deserializes from the binary wire format.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Encodes any serializable value as CBOR.
pub fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a CBOR value.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

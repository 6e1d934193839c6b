//! Channel membership and fan-out.
//!
//! The coordinator holds only membership: which connections are joined to
//! which user's channel. It never stores cart contents.
//!
//! Channels live in a sharded map keyed by user. Join, leave and the member
//! read inside broadcast all take the channel's entry exclusively, so a
//! broadcast sees either the membership before a join or after it, never a
//! half-applied one, and unrelated users do not contend. Delivery happens
//! while the entry is held, using non-blocking sends, which keeps each
//! channel's events in sequence order on every connection.
//!
//! Lock order: channel entry, then connection entry. Nothing takes them the
//! other way round.

use crate::config::ServerConfig;
use crate::error::{DeliveryFailure, ServerError, ServerResult};
use cartsync_protocol::{ChannelKey, ConnectionId, MutationEvent, SequencedEvent, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Statistics for monitoring the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Registered connections.
    pub active_connections: usize,
    /// Channels with at least one member.
    pub active_channels: usize,
    /// Events accepted for broadcast.
    pub messages_broadcast: u64,
    /// Per-connection deliveries that succeeded.
    pub messages_delivered: u64,
    /// Per-connection deliveries that were dropped.
    pub messages_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    broadcast: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug)]
struct Channel {
    key: ChannelKey,
    members: HashSet<ConnectionId>,
    next_sequence: u64,
}

impl Channel {
    fn new(key: ChannelKey) -> Self {
        Self {
            key,
            members: HashSet::new(),
            next_sequence: 1,
        }
    }
}

/// Routes each user's mutation events to all of that user's connections.
#[derive(Debug)]
pub struct BroadcastCoordinator {
    delivery_capacity: usize,
    max_members: usize,
    channels: DashMap<UserId, Channel>,
    connections: DashMap<ConnectionId, mpsc::Sender<SequencedEvent>>,
    counters: Counters,
}

impl Default for BroadcastCoordinator {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}

impl BroadcastCoordinator {
    /// Creates a coordinator with the limits in `config`.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            delivery_capacity: config.delivery_capacity.max(1),
            max_members: config.max_members_per_channel,
            channels: DashMap::new(),
            connections: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Registers a connection and returns its ID with its delivery queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<SequencedEvent>) {
        let (tx, rx) = mpsc::channel(self.delivery_capacity);
        let id = ConnectionId::new_v4();
        self.connections.insert(id, tx);
        debug!(connection_id = %id, "connection registered");
        (id, rx)
    }

    /// Unregisters a connection and removes it from every channel.
    ///
    /// Returns false if the connection was not registered.
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        let known = self.connections.remove(&connection_id).is_some();
        self.channels.retain(|_, channel| {
            channel.members.remove(&connection_id);
            !channel.members.is_empty()
        });
        if known {
            debug!(%connection_id, "connection unregistered");
        }
        known
    }

    /// Adds a connection to a user's channel, creating the channel if
    /// needed. Joining twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownConnection`] for an unregistered
    /// connection and [`ServerError::ChannelFull`] when the member limit
    /// is reached.
    pub fn join(&self, user_id: &UserId, connection_id: ConnectionId) -> ServerResult<ChannelKey> {
        match self.channels.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                let channel = entry.get_mut();
                if channel.members.contains(&connection_id) {
                    return Ok(channel.key.clone());
                }
                if !self.connections.contains_key(&connection_id) {
                    return Err(ServerError::UnknownConnection(connection_id));
                }
                if channel.members.len() >= self.max_members {
                    return Err(ServerError::ChannelFull {
                        channel: channel.key.to_string(),
                        max: self.max_members,
                    });
                }
                channel.members.insert(connection_id);
                debug!(channel = %channel.key, %connection_id, members = channel.members.len(), "joined");
                Ok(channel.key.clone())
            }
            Entry::Vacant(entry) => {
                if !self.connections.contains_key(&connection_id) {
                    return Err(ServerError::UnknownConnection(connection_id));
                }
                let key = ChannelKey::for_user(user_id);
                if self.max_members == 0 {
                    return Err(ServerError::ChannelFull {
                        channel: key.to_string(),
                        max: 0,
                    });
                }
                let mut channel = Channel::new(key.clone());
                channel.members.insert(connection_id);
                entry.insert(channel);
                debug!(channel = %key, %connection_id, "channel created");
                Ok(key)
            }
        }
    }

    /// Removes a connection from a user's channel, dropping the channel
    /// once it is empty. Returns true if the connection was a member.
    pub fn leave(&self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        let mut was_member = false;
        self.channels.remove_if_mut(user_id, |_, channel| {
            was_member = channel.members.remove(&connection_id);
            channel.members.is_empty()
        });
        if was_member {
            debug!(%user_id, %connection_id, "left");
        }
        was_member
    }

    /// Sends `event` to every member of the user's channel, the origin
    /// included.
    ///
    /// The event is stamped with the channel's next sequence number. A full
    /// or closed delivery queue drops the event for that connection only.
    /// Returns the number of connections the event was queued for.
    pub fn broadcast(&self, user_id: &UserId, event: MutationEvent, origin: ConnectionId) -> usize {
        let Some(mut channel) = self.channels.get_mut(user_id) else {
            debug!(%user_id, "broadcast to channel without members");
            return 0;
        };

        let sequence = channel.next_sequence;
        channel.next_sequence += 1;
        let envelope = SequencedEvent {
            channel: channel.key.clone(),
            sequence,
            origin,
            event,
        };
        self.counters.broadcast.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for member in &channel.members {
            match self.deliver(*member, envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(failure) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(channel = %channel.key, connection_id = %member, sequence, %failure, "delivery dropped");
                }
            }
        }
        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    fn deliver(&self, member: ConnectionId, envelope: SequencedEvent) -> Result<(), DeliveryFailure> {
        let Some(sender) = self.connections.get(&member) else {
            return Err(DeliveryFailure::Disconnected);
        };
        sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Disconnected,
        })
    }

    /// Returns the members of a user's channel.
    pub fn members(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.channels
            .get(user_id)
            .map(|channel| channel.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns true if the connection is registered.
    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active_connections: self.connections.len(),
            active_channels: self.channels.len(),
            messages_broadcast: self.counters.broadcast.load(Ordering::Relaxed),
            messages_delivered: self.counters.delivered.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

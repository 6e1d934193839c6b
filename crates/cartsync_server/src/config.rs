//! Server configuration.

use std::net::SocketAddr;

/// Default port of the coordinator.
pub const DEFAULT_PORT: u16 = 9470;

/// Configuration for the coordinator server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Capacity of each connection's delivery queue.
    pub delivery_capacity: usize,
    /// Maximum connections joined to one channel.
    pub max_members_per_channel: usize,
    /// Frame buffer between a socket and its session.
    pub frame_buffer: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            delivery_capacity: 256,
            max_members_per_channel: 64,
            frame_buffer: 64,
        }
    }

    /// Sets the per-connection delivery queue capacity (at least 1).
    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity.max(1);
        self
    }

    /// Sets the maximum members per channel.
    pub fn with_max_members_per_channel(mut self, max: usize) -> Self {
        self.max_members_per_channel = max;
        self
    }

    /// Sets the socket-to-session frame buffer (at least 1).
    pub fn with_frame_buffer(mut self, buffer: usize) -> Self {
        self.frame_buffer = buffer.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}

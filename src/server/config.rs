//! Hub configuration

use std::net::SocketAddr;

use crate::protocol::codec::DEFAULT_MAX_FRAME_LEN;

/// Hub configuration options
///
/// Shared by the gateway and handed read-only to every service plugin at
/// setup, so plugins can honor deployment-wide settings.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum length of one wire frame in bytes
    pub max_frame_len: usize,

    /// Outbound packet queue depth per client
    pub outbound_capacity: usize,

    /// Control path event queue depth (inbound packets, disconnects)
    pub event_capacity: usize,

    /// Publish channel depth shared by all service workers
    pub publish_capacity: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".parse().unwrap(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbound_capacity: 64,
            event_capacity: 256,
            publish_capacity: 256,
            tcp_nodelay: true, // Notify latency matters more than throughput
        }
    }
}

impl HubConfig {
    /// Create a new config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the maximum frame length
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len.max(1);
        self
    }

    /// Set the per-client outbound queue depth
    pub fn outbound_capacity(mut self, depth: usize) -> Self {
        self.outbound_capacity = depth.max(1);
        self
    }

    /// Set the control path event queue depth
    pub fn event_capacity(mut self, depth: usize) -> Self {
        self.event_capacity = depth.max(1);
        self
    }

    /// Set the publish channel depth
    ///
    /// Should comfortably exceed the number of registered services so that
    /// producers rarely block each other.
    pub fn publish_capacity(mut self, depth: usize) -> Self {
        self.publish_capacity = depth.max(1);
        self
    }

    /// Enable or disable TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert_eq!(config.outbound_capacity, 64);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.publish_capacity, 256);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let config = HubConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn test_builder_bind() {
        let addr: SocketAddr = "0.0.0.0:8100".parse().unwrap();
        let config = HubConfig::default().bind(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_builder_queue_depths_floor_at_one() {
        let config = HubConfig::default()
            .outbound_capacity(0)
            .event_capacity(0)
            .publish_capacity(0);

        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.publish_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8200".parse().unwrap();
        let config = HubConfig::default()
            .bind(addr)
            .max_frame_len(4096)
            .outbound_capacity(8)
            .event_capacity(32)
            .publish_capacity(16)
            .tcp_nodelay(false);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_frame_len, 4096);
        assert_eq!(config.outbound_capacity, 8);
        assert_eq!(config.event_capacity, 32);
        assert_eq!(config.publish_capacity, 16);
        assert!(!config.tcp_nodelay);
    }
}

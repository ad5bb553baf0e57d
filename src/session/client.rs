//! Per-connection session state

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::Packet;

/// Identifier assigned to each accepted connection, unique for the lifetime
/// of the gateway.
pub type SessionId = u64;

/// Default username until the client picks one with `set_username`.
pub const DEFAULT_USERNAME: &str = "anonymous";

/// State for one connected client.
///
/// All mutation happens on the gateway control path; the reader and writer
/// tasks never touch this struct. Outbound packets go through a bounded
/// queue to the writer task and are dropped (and counted) when the client
/// cannot keep up, so one slow consumer never stalls the control path.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    peer_addr: SocketAddr,
    username: String,
    subscriptions: BTreeSet<String>,
    connected: bool,
    connected_at: Instant,
    outbound: mpsc::Sender<Packet>,
    packets_sent: u64,
    packets_dropped: u64,
}

impl ClientSession {
    /// Create a session for a freshly accepted connection.
    pub fn new(id: SessionId, peer_addr: SocketAddr, outbound: mpsc::Sender<Packet>) -> Self {
        ClientSession {
            id,
            peer_addr,
            username: DEFAULT_USERNAME.to_string(),
            subscriptions: BTreeSet::new(),
            connected: true,
            connected_at: Instant::now(),
            outbound,
            packets_sent: 0,
            packets_dropped: 0,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address of the connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Replace the username. Any string is accepted, including empty.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    /// False once [`close`](Self::close) has run.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time since the connection was accepted.
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Record a subscription. Returns false when it was already present.
    pub fn subscribe(&mut self, service: &str) -> bool {
        self.subscriptions.insert(service.to_string())
    }

    /// Remove a subscription. Returns false when it was not present.
    pub fn unsubscribe(&mut self, service: &str) -> bool {
        self.subscriptions.remove(service)
    }

    /// True when the session is subscribed to the named service.
    pub fn is_subscribed(&self, service: &str) -> bool {
        self.subscriptions.contains(service)
    }

    /// Subscribed service names in sorted order.
    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    /// Queue a packet for the writer task.
    ///
    /// Returns true when the packet was enqueued. A full queue drops the
    /// packet rather than waiting, a closed or disconnected session drops
    /// it silently.
    pub fn send(&mut self, packet: Packet) -> bool {
        if !self.connected {
            return false;
        }
        match self.outbound.try_send(packet) {
            Ok(()) => {
                self.packets_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.packets_dropped += 1;
                tracing::debug!(client = %self, "Outbound queue full, dropping packet");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Mark the session disconnected and drain its subscription set.
    ///
    /// Returns the services the session was subscribed to so the caller can
    /// release them in the registry. Idempotent: a second call returns an
    /// empty list.
    pub fn close(&mut self) -> Vec<String> {
        if !self.connected {
            return Vec::new();
        }
        self.connected = false;
        std::mem::take(&mut self.subscriptions).into_iter().collect()
    }

    /// Packets successfully handed to the writer task.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Packets dropped because the outbound queue was full.
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped
    }
}

impl std::fmt::Display for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.id)
    }
}

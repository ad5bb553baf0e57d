//! Service plugins and the worker publish bridge
//!
//! A service is a named data producer that only runs while somebody is
//! listening. The registry activates a plugin when its subscriber count goes
//! from zero to one and deactivates it on the way back down.
//!
//! Plugins that produce data continuously do so from their own worker
//! thread and hand values to the hub through a [`PublishHandle`]:
//!
//! ```text
//!  worker thread ──publish()──▶ bounded channel ──▶ gateway control path
//!                                                        │
//!                                          notify_values to subscribers
//! ```
//!
//! The channel is bounded, so a producer that outruns the hub blocks in
//! `publish` instead of growing a queue without limit.

pub mod catalog;
pub mod heartbeat;
pub mod temperature;

pub use catalog::{ServiceCatalog, ServiceFactory};
pub use heartbeat::Heartbeat;
pub use temperature::BoardTemperature;

use tokio::sync::mpsc;

use crate::protocol::Payload;
use crate::server::config::HubConfig;

/// A pluggable data producer managed by the registry.
///
/// Implementations must be `Send`: the plugin object lives on the gateway
/// control path, which may run on any runtime worker thread.
pub trait ServicePlugin: Send {
    /// Bring the service up. Called when the subscriber count goes 0 -> 1.
    ///
    /// A continuous producer spawns its worker thread here and keeps the
    /// handle for [`cleanup`](Self::cleanup). On error the service stays
    /// down and the subscribe request that triggered it is rejected; a later
    /// subscribe will call `setup` again.
    fn setup(&mut self, config: &HubConfig, publisher: PublishHandle) -> Result<(), SetupError>;

    /// Tear the service down. Called when the subscriber count reaches zero
    /// and once more at hub shutdown for services still active. Must stop
    /// and join any worker started in `setup`.
    ///
    /// `cleanup` runs on the control path, which does not drain the publish
    /// channel while it waits for the join. The worker must therefore honor
    /// its stop signal without publishing again first: a worker that insists
    /// on one more [`PublishHandle::publish`] against a full channel can
    /// never be joined.
    fn cleanup(&mut self);

    /// Client-to-service input. Reserved for producer/consumer services;
    /// the default implementation discards the values.
    fn post(&mut self, _values: &Payload) {}
}

/// Values published by one service, tagged with its registry name.
#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub service: String,
    pub values: Payload,
}

/// Write end of the publish channel, handed to a plugin at setup.
///
/// Cloneable and tied to the service's registry name, so a plugin cannot
/// publish under another service's name.
#[derive(Debug, Clone)]
pub struct PublishHandle {
    service: String,
    tx: mpsc::Sender<PublishEvent>,
}

impl PublishHandle {
    pub(crate) fn new(service: String, tx: mpsc::Sender<PublishEvent>) -> Self {
        PublishHandle { service, tx }
    }

    /// Registry name of the service this handle publishes for.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Deliver one batch of values to every current subscriber.
    ///
    /// Blocks while the publish channel is full. Must be called from a
    /// plugin worker thread, never from an async task.
    pub fn publish(&self, values: Payload) -> Result<(), PublishError> {
        self.tx
            .blocking_send(PublishEvent {
                service: self.service.clone(),
                values,
            })
            .map_err(|_| PublishError::HubClosed)
    }
}

/// Error returned by [`PublishHandle::publish`].
#[derive(Debug)]
pub enum PublishError {
    /// The hub has shut down; the worker should exit.
    HubClosed,
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::HubClosed => write!(f, "Hub is shut down"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Failure reported by [`ServicePlugin::setup`].
#[derive(Debug)]
pub struct SetupError {
    message: String,
}

impl SetupError {
    pub fn new(message: impl Into<String>) -> Self {
        SetupError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SetupError {}

impl From<std::io::Error> for SetupError {
    fn from(e: std::io::Error) -> Self {
        SetupError::new(e.to_string())
    }
}

/// Failure reported by a [`ServiceCatalog`] factory while constructing a
/// plugin at hub startup.
#[derive(Debug)]
pub struct PluginError {
    message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        PluginError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PluginError {}

//! # sensor-hub
//!
//! A pub/sub hub daemon for pluggable telemetry services.
//!
//! Clients connect over TCP, subscribe to named services by sending
//! newline-delimited JSON packets, and receive `notify_values` events for
//! as long as they stay subscribed. Services are lazy: a plugin is only
//! started when its first subscriber arrives and is torn down when its
//! last subscriber leaves.
//!
//! ## Wire protocol
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"event": "subscribe", "payload": {"service_name": "heartbeat"}}
//! <- {"event": "subscribe", "payload": {"message": "successfully subscribed to service heartbeat"}}
//! <- {"event": "notify_values", "payload": {"service": "heartbeat", "values": {"seq": 0, "uptime_secs": 0}}}
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   TCP clients         per-connection tasks         control path
//!   ┌────────┐  frames  ┌─────────────────┐  mpsc  ┌───────────────────┐
//!   │ client │◀────────▶│ reader / writer │◀──────▶│ ConnectionGateway │
//!   └────────┘          └─────────────────┘        │   GatewayState    │
//!                                                  │   CommandRouter   │
//!   service workers (plain threads)                │   ServiceRegistry │
//!   ┌───────────────┐  PublishHandle  ┌─────────┐  │                   │
//!   │ plugin worker │────────────────▶│ channel │─▶│                   │
//!   └───────────────┘                 └─────────┘  └───────────────────┘
//! ```
//!
//! All mutable state lives on one `select!` control path, so subscribe,
//! publish and disconnect never race.
//!
//! ## Quick start
//!
//! ```no_run
//! use sensor_hub::{ConnectionGateway, HubConfig, ServiceCatalog};
//!
//! #[tokio::main]
//! async fn main() -> sensor_hub::Result<()> {
//!     let config = HubConfig::default();
//!     let gateway = ConnectionGateway::bind(config, ServiceCatalog::builtin()).await?;
//!     gateway.run().await
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod session;

pub use error::{Error, Result};
pub use protocol::{CodecError, Packet, PacketCodec, ParseError, Payload};
pub use registry::{
    ActivationState, ServiceRegistry, SubscribeError, SubscribeOutcome, UnsubscribeError,
    UnsubscribeOutcome,
};
pub use server::{CommandRouter, ConnectionGateway, GatewayState, HubConfig};
pub use service::{
    PluginError, PublishError, PublishEvent, PublishHandle, ServiceCatalog, ServicePlugin,
    SetupError,
};
pub use session::{ClientSession, SessionId};

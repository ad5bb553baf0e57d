//! Hub server: connection gateway, command routing, shared state
//!
//! The gateway accepts TCP connections and runs the single control path
//! that owns all mutable hub state:
//!
//! ```text
//!   client A ──▶ reader task ──┐
//!   client B ──▶ reader task ──┤ events    ┌──────────────────────┐
//!                              ├──────────▶│  control path        │
//!   service workers ───────────┘ publishes │  GatewayState        │
//!                                          │  sessions, registry  │
//!                                          └─────────┬────────────┘
//!                                                    │ try_send
//!                               writer task ◀────────┤
//!                               writer task ◀────────┘
//! ```
//!
//! Reader and writer tasks never share state; everything meets in one
//! `select!` loop, so commands, disconnects and publishes are serialized
//! without locks.

pub mod config;
pub mod gateway;
pub mod router;
pub mod state;

pub use config::HubConfig;
pub use gateway::ConnectionGateway;
pub use router::CommandRouter;
pub use state::GatewayState;

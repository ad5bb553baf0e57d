//! Service registry: subscriber tracking and lazy activation
//!
//! The registry owns one [`ServiceInstance`] per catalog entry and drives
//! each through its activation lifecycle:
//!
//! ```text
//!                 subscribe (0 -> 1)
//!                 plugin.setup() ok
//!   ┌──────────┐ ───────────────────▶ ┌────────┐
//!   │ Inactive │                      │ Active │
//!   └──────────┘ ◀─────────────────── └────────┘
//!                 unsubscribe (1 -> 0)
//!                 plugin.cleanup()
//! ```
//!
//! Instances are created at hub startup and never removed; a service with
//! no subscribers is deactivated, not forgotten. All registry access runs
//! on the gateway control path, so there is no locking here.

pub mod error;
pub mod instance;
pub mod store;

pub use error::{SubscribeError, UnsubscribeError};
pub use instance::{ActivationState, ServiceInstance, SubscribeOutcome, UnsubscribeOutcome};
pub use store::ServiceRegistry;

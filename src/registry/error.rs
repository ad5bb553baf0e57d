//! Registry error types
//!
//! Outcomes a client can be blamed for (asking twice, asking for nothing)
//! are not errors; they live in [`super::instance`] as outcome enums. The
//! types here are the requests the registry actually refuses.

use crate::service::SetupError;

/// Error type for subscribe requests.
#[derive(Debug)]
pub enum SubscribeError {
    /// No service with that name in the registry.
    UnknownService(String),
    /// The service's plugin failed to start; the service stays inactive.
    SetupFailed { service: String, source: SetupError },
}

impl std::fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscribeError::UnknownService(name) => write!(f, "Unknown service: {}", name),
            SubscribeError::SetupFailed { service, source } => {
                write!(f, "Service {} failed to start: {}", service, source)
            }
        }
    }
}

impl std::error::Error for SubscribeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubscribeError::SetupFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error type for unsubscribe requests.
#[derive(Debug)]
pub enum UnsubscribeError {
    /// No service with that name in the registry.
    UnknownService(String),
}

impl std::fmt::Display for UnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsubscribeError::UnknownService(name) => write!(f, "Unknown service: {}", name),
        }
    }
}

impl std::error::Error for UnsubscribeError {}

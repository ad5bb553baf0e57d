//! Crate-level error types
//!
//! Only conditions that are fatal to the daemon itself live here. Everything
//! else (protocol violations, plugin failures, unknown services) is contained
//! at the point of occurrence and reported to the offending client or the log.

use std::io;

/// Convenience result alias for server-fatal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for server-fatal conditions.
#[derive(Debug)]
pub enum Error {
    /// Binding the listener failed.
    Bind(io::Error),
    /// The accept loop hit an unrecoverable error.
    Accept(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Bind(e) => write!(f, "Failed to bind listener: {}", e),
            Error::Accept(e) => write!(f, "Accept loop failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind(e) | Error::Accept(e) => Some(e),
        }
    }
}

//! Client session bookkeeping
//!
//! One [`ClientSession`] per accepted connection, owned exclusively by the
//! gateway control path. The session holds the client's identity, its
//! subscription set, and the bounded handle to the connection's writer task.

pub mod client;

pub use client::{ClientSession, SessionId, DEFAULT_USERNAME};

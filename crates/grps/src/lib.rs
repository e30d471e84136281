//! GRP relay server — transparent UDP relay with connection-request
//! preauthentication in front of a backend game server.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
/// Error types for relay server operations.
pub mod error;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Per-peer relay lifecycle and opaque forwarding.
pub mod peer;
/// Handshake preauthentication engine and challenge registry.
pub mod preauth;
mod request;
/// Listener loop, peer registry, and idle sweep.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};

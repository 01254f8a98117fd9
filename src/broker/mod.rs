//! # Broker Module
//!
//! Network side of linemq.
//!
//! - `engine`: the connection multiplexer that owns the queue store and
//!   serves the line protocol over TCP.
//! - `transport`: reliable send and line-delimited receive with a bounded
//!   retry budget, shared by both ends.
//! - `client`: a small client library speaking the same protocol.

pub mod client;
pub mod engine;
pub mod transport;

/// Re-export of the `serve` function to start the broker server.
///
/// # Example
///
/// ```bash
/// linemq 127.0.0.1 7000
/// ```
pub use self::engine::serve;
pub use self::engine::server;

//! linemq – a minimal line-oriented message queue broker.
//!
//! This crate exports
//!  * `core`    – messages, bounded TTL queues, the queue store, the line codec
//!  * `broker`  – TCP event loop, line transport and client library
//!  * `config`  – TOML + environment runtime configuration
//!  * `logging` – tracing subscriber setup
//!
//! Downstream applications can embed the broker engine (`start_broker`) or
//! talk to a running broker through `broker::client::Client`.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod broker;
pub mod config;
pub mod core;
pub mod logging;
pub mod util;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use broker::client::{Client, ClientError, Subscription};
pub use broker::engine::serve as start_broker;
pub use broker::engine::Broker;
pub use config::{load_config, Config};

//! Server engine module for the linemq broker.
//!
//! Exposes `serve`, which binds the listener and runs the single-task event
//! loop, and `Broker` for callers that bind the listener themselves.

pub mod server;

pub use server::{serve, Broker};

//! Subscriber handles.
//!
//! Queues never own connections: they hold a `ConnectionId` and reach the
//! socket through a `DeliverySink` supplied by whoever owns the connections.

#[allow(clippy::module_inception)]
pub mod subscriber;

pub use subscriber::{ConnectionId, DeliverySink};

use async_trait::async_trait;
use std::fmt;

use crate::core::error::TransportError;

/// Non-owning handle to an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        ConnectionId(id)
    }
}

/// Writes pushes to subscriber connections on behalf of the queue store.
///
/// Implementations resolve the handle to a live socket; an unknown handle is
/// reported as `TransportError::Closed`.
#[async_trait]
pub trait DeliverySink: Send {
    async fn push(&mut self, subscriber: ConnectionId, line: &str) -> Result<(), TransportError>;
}

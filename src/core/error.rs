use thiserror::Error;

use crate::core::subscriber::ConnectionId;

/// Domain failures reported by the queue store.
///
/// None of these tear a connection down; the broker answers them with `ERROR`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("queue '{0}' already exists")]
    AlreadyExists(String),

    #[error("queue limit of {0} reached")]
    StoreFull(usize),

    #[error("queue '{0}' not found")]
    NotFound(String),

    #[error("queue '{0}' is full")]
    Full(String),

    #[error("queue '{0}' has reached its subscriber limit")]
    SubscriberLimitReached(String),

    #[error("message stored in '{queue}' but delivery failed for {failed} subscriber(s)")]
    PartialDeliveryFailure { queue: String, failed: usize },

    #[error("capacity {0} is outside the accepted range")]
    InvalidCapacity(i64),

    #[error("ttl {0} must not be negative")]
    InvalidTtl(i64),

    #[error("message body of {0} bytes exceeds the limit")]
    MessageTooLarge(usize),

    #[error("connection {0} is already subscribed to '{1}'")]
    AlreadySubscribed(ConnectionId, String),
}

/// Connection-fatal failures of the line transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Closed,

    #[error("gave up after {0} stalled attempts")]
    RetriesExhausted(u32),

    #[error("line exceeds {0} bytes without a terminator")]
    LineTooLong(usize),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

use std::time::Duration;

use tokio::time::Instant;

/// Longest accepted body, so that a body plus its `\n` terminator fits in 254 bytes.
pub const MAX_BODY_LEN: usize = 253;

/// A stored message. Immutable once appended to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    pub created_at: Instant,
}

pub fn new_message(body: impl Into<String>) -> Message {
    with_timestamp(body, Instant::now())
}

pub fn with_timestamp(body: impl Into<String>, created_at: Instant) -> Message {
    Message {
        body: body.into(),
        created_at,
    }
}

impl Message {
    #[inline]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// A message is visible while its age is strictly below the ttl.
    #[inline]
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) >= ttl
    }

    /// Wire form of a push: the body followed by a single newline.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.body.len() + 1);
        line.push_str(&self.body);
        line.push('\n');
        line
    }
}

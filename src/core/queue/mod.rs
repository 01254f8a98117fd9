//! Named, bounded, TTL-limited queues.
//!
//! A [`Queue`] keeps its messages in insertion order and never evicts a live
//! message to make room: once `capacity` messages are stored, further
//! publishes are refused until the TTL sweep frees space.
//!
//! Expiry is lazy. Nothing runs on a timer inside the queue; callers pass
//! `now` and the queue drops whatever is past its TTL before it is read.

pub mod store;

pub use store::{QueueStore, StoreLimits};

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::error::StoreError;
use crate::core::message::Message;
use crate::core::subscriber::ConnectionId;

#[derive(Debug)]
pub struct Queue {
    name: String,
    capacity: usize,
    ttl: Duration,
    max_subscribers: usize,
    messages: VecDeque<Message>,
    subscribers: Vec<ConnectionId>,
}

impl Queue {
    pub fn new(name: impl Into<String>, capacity: usize, ttl: Duration, max_subscribers: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            ttl,
            max_subscribers,
            messages: VecDeque::with_capacity(capacity),
            subscribers: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored messages, expired or not. Call [`Queue::expire`] first
    /// for an exact count.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.capacity
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribers(&self) -> &[ConnectionId] {
        &self.subscribers
    }

    pub fn has_subscriber(&self, conn: ConnectionId) -> bool {
        self.subscribers.contains(&conn)
    }

    /// Appends a message, refusing it when the queue is at capacity.
    pub fn push(&mut self, message: Message) -> Result<&Message, StoreError> {
        if self.is_full() {
            return Err(StoreError::Full(self.name.clone()));
        }
        self.messages.push_back(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Adds `conn` to the subscriber set. Re-adding a present handle is a no-op.
    pub fn add_subscriber(&mut self, conn: ConnectionId) -> Result<(), StoreError> {
        if self.has_subscriber(conn) {
            return Ok(());
        }
        if self.subscribers.len() >= self.max_subscribers {
            return Err(StoreError::SubscriberLimitReached(self.name.clone()));
        }
        self.subscribers.push(conn);
        Ok(())
    }

    pub fn remove_subscriber(&mut self, conn: ConnectionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|c| *c != conn);
        self.subscribers.len() != before
    }

    /// Drops every message whose age has reached the TTL, keeping the rest in
    /// order. Returns how many were removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.messages.len();
        let ttl = self.ttl;
        self.messages.retain(|m| !m.is_expired(ttl, now));
        before - self.messages.len()
    }

    /// Live messages in insertion order.
    pub fn backlog(&self, now: Instant) -> impl Iterator<Item = &Message> {
        let ttl = self.ttl;
        self.messages.iter().filter(move |m| !m.is_expired(ttl, now))
    }
}

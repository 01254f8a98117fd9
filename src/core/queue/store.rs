//! The queue store: every named queue the broker knows about.
//!
//! The store is plain owned state with no interior locking. It is meant to be
//! held by exactly one task (the broker's event loop), which makes that task
//! the only mutator of every queue and fixes the fan-out order to the order
//! in which publishes are handled.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::delivery_mode::FanoutPolicy;
use crate::core::error::StoreError;
use crate::core::message::{new_message, MAX_BODY_LEN};
use crate::core::queue::Queue;
use crate::core::subscriber::{ConnectionId, DeliverySink};

/// Fixed bounds applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_queues: usize,
    pub max_capacity: usize,
    pub max_subscribers: usize,
    pub fanout_policy: FanoutPolicy,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_queues: 15,
            max_capacity: 200,
            max_subscribers: 10,
            fanout_policy: FanoutPolicy::Abort,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueueStore {
    queues: HashMap<String, Queue>,
    limits: StoreLimits,
}

impl QueueStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            queues: HashMap::with_capacity(limits.max_queues),
            limits,
        }
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    /// Creates an empty queue. Existing queues are never touched.
    pub fn create_queue(&mut self, name: &str, capacity: i64, ttl_secs: i64) -> Result<(), StoreError> {
        if self.queues.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        if self.queues.len() >= self.limits.max_queues {
            return Err(StoreError::StoreFull(self.limits.max_queues));
        }
        if capacity < 1 || capacity as u64 > self.limits.max_capacity as u64 {
            return Err(StoreError::InvalidCapacity(capacity));
        }
        if ttl_secs < 0 {
            return Err(StoreError::InvalidTtl(ttl_secs));
        }

        let queue = Queue::new(
            name,
            capacity as usize,
            Duration::from_secs(ttl_secs as u64),
            self.limits.max_subscribers,
        );
        self.queues.insert(name.to_string(), queue);
        info!(queue = name, capacity, ttl_secs, "queue created");
        Ok(())
    }

    /// Appends `body` to the named queue and pushes it to every subscriber.
    ///
    /// The message is stored before any delivery is attempted and stays stored
    /// whatever the delivery outcome. Under [`FanoutPolicy::Abort`] the first
    /// failed push stops the fan-out and the call returns
    /// [`StoreError::PartialDeliveryFailure`]; under [`FanoutPolicy::Isolate`]
    /// failed subscribers are skipped and the call succeeds.
    pub async fn publish<S>(&mut self, name: &str, body: &str, sink: &mut S) -> Result<(), StoreError>
    where
        S: DeliverySink + ?Sized,
    {
        if body.len() > MAX_BODY_LEN {
            return Err(StoreError::MessageTooLarge(body.len()));
        }

        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let message = new_message(body);
        queue.expire(message.created_at);
        let line = queue.push(message)?.to_line();
        let targets = queue.subscribers().to_vec();

        let mut failed = 0usize;
        for conn in targets {
            if let Err(e) = sink.push(conn, &line).await {
                warn!(queue = name, subscriber = %conn, error = %e, "fan-out push failed");
                failed += 1;
                if self.limits.fanout_policy == FanoutPolicy::Abort {
                    break;
                }
            }
        }

        match (failed, self.limits.fanout_policy) {
            (0, _) => Ok(()),
            (_, FanoutPolicy::Isolate) => Ok(()),
            (failed, FanoutPolicy::Abort) => Err(StoreError::PartialDeliveryFailure {
                queue: name.to_string(),
                failed,
            }),
        }
    }

    /// Registers `conn` as a subscriber. Backlog replay is a separate step,
    /// see [`QueueStore::backlog`].
    pub fn subscribe(&mut self, name: &str, conn: ConnectionId) -> Result<(), StoreError> {
        if let Some(other) = self.subscription_of(conn) {
            if other != name {
                return Err(StoreError::AlreadySubscribed(conn, other.to_string()));
            }
        }

        let queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        queue.add_subscriber(conn)?;
        debug!(queue = name, subscriber = %conn, "subscribed");
        Ok(())
    }

    /// Live messages of the named queue as push lines, oldest first.
    pub fn backlog(&self, name: &str, now: Instant) -> Result<Vec<String>, StoreError> {
        let queue = self
            .queues
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(queue.backlog(now).map(|m| m.to_line()).collect())
    }

    /// Removes expired messages from every queue. Returns the number removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        for queue in self.queues.values_mut() {
            let n = queue.expire(now);
            if n > 0 {
                debug!(queue = queue.name(), expired = n, "swept expired messages");
            }
            removed += n;
        }
        removed
    }

    /// Drops `conn` from whichever subscriber set holds it.
    /// Returns the queue it was removed from.
    pub fn unsubscribe(&mut self, conn: ConnectionId) -> Option<String> {
        for queue in self.queues.values_mut() {
            if queue.remove_subscriber(conn) {
                debug!(queue = queue.name(), subscriber = %conn, "unsubscribed");
                return Some(queue.name().to_string());
            }
        }
        None
    }

    /// Name of the queue `conn` is subscribed to, if any.
    pub fn subscription_of(&self, conn: ConnectionId) -> Option<&str> {
        self.queues
            .values()
            .find(|q| q.has_subscriber(conn))
            .map(|q| q.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransportError;
    use async_trait::async_trait;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingSink {
        pushes: Vec<(ConnectionId, String)>,
        broken: HashSet<ConnectionId>,
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn push(&mut self, subscriber: ConnectionId, line: &str) -> Result<(), TransportError> {
            if self.broken.contains(&subscriber) {
                return Err(TransportError::Closed);
            }
            self.pushes.push((subscriber, line.to_string()));
            Ok(())
        }
    }

    fn store() -> QueueStore {
        QueueStore::new(StoreLimits::default())
    }

    #[test]
    fn duplicate_name_is_rejected_and_original_kept() {
        let mut s = store();
        s.create_queue("q", 10, 60).unwrap();

        assert_eq!(s.create_queue("q", 5, 5), Err(StoreError::AlreadyExists("q".into())));
        let q = s.get("q").unwrap();
        assert_eq!(q.capacity(), 10);
        assert_eq!(q.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn store_limit_is_enforced() {
        let mut s = QueueStore::new(StoreLimits {
            max_queues: 2,
            ..StoreLimits::default()
        });
        s.create_queue("a", 1, 1).unwrap();
        s.create_queue("b", 1, 1).unwrap();

        assert_eq!(s.create_queue("c", 1, 1), Err(StoreError::StoreFull(2)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn creation_bounds_are_validated() {
        let mut s = store();
        assert_eq!(s.create_queue("zero", 0, 1), Err(StoreError::InvalidCapacity(0)));
        assert_eq!(s.create_queue("big", 201, 1), Err(StoreError::InvalidCapacity(201)));
        assert_eq!(s.create_queue("neg", 1, -1), Err(StoreError::InvalidTtl(-1)));
        assert!(s.is_empty());
        s.create_queue("zero-ttl", 1, 0).unwrap();
    }

    #[tokio::test]
    async fn publish_beyond_capacity_fails_and_count_stays() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 3, 60).unwrap();

        for i in 0..3 {
            s.publish("q", &format!("m{i}"), &mut sink).await.unwrap();
        }
        assert_eq!(
            s.publish("q", "m3", &mut sink).await,
            Err(StoreError::Full("q".into()))
        );
        assert_eq!(s.get("q").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn publish_to_unknown_queue_fails() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        assert_eq!(
            s.publish("nope", "x", &mut sink).await,
            Err(StoreError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 1, 60).unwrap();

        let body = "x".repeat(MAX_BODY_LEN + 1);
        assert_eq!(
            s.publish("q", &body, &mut sink).await,
            Err(StoreError::MessageTooLarge(MAX_BODY_LEN + 1))
        );
        s.publish("q", &"x".repeat(MAX_BODY_LEN), &mut sink).await.unwrap();
    }

    #[tokio::test]
    async fn fan_out_reaches_subscribers_in_publish_order() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 10, 60).unwrap();
        s.subscribe("q", ConnectionId(1)).unwrap();
        s.subscribe("q", ConnectionId(2)).unwrap();

        s.publish("q", "m1", &mut sink).await.unwrap();
        s.publish("q", "m2", &mut sink).await.unwrap();

        for conn in [ConnectionId(1), ConnectionId(2)] {
            let seen: Vec<_> = sink
                .pushes
                .iter()
                .filter(|(c, _)| *c == conn)
                .map(|(_, l)| l.as_str())
                .collect();
            assert_eq!(seen, ["m1\n", "m2\n"]);
        }
    }

    #[tokio::test]
    async fn abort_policy_fails_publish_but_keeps_message() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        sink.broken.insert(ConnectionId(1));
        s.create_queue("q", 10, 60).unwrap();
        s.subscribe("q", ConnectionId(1)).unwrap();
        s.subscribe("q", ConnectionId(2)).unwrap();

        let res = s.publish("q", "hello", &mut sink).await;

        assert_eq!(
            res,
            Err(StoreError::PartialDeliveryFailure {
                queue: "q".into(),
                failed: 1
            })
        );
        // iteration stopped before the healthy subscriber
        assert!(sink.pushes.is_empty());
        assert_eq!(s.backlog("q", Instant::now()).unwrap(), ["hello\n"]);
    }

    #[tokio::test]
    async fn isolate_policy_delivers_to_healthy_subscribers() {
        let mut s = QueueStore::new(StoreLimits {
            fanout_policy: FanoutPolicy::Isolate,
            ..StoreLimits::default()
        });
        let mut sink = RecordingSink::default();
        sink.broken.insert(ConnectionId(1));
        s.create_queue("q", 10, 60).unwrap();
        s.subscribe("q", ConnectionId(1)).unwrap();
        s.subscribe("q", ConnectionId(2)).unwrap();

        s.publish("q", "hello", &mut sink).await.unwrap();

        assert_eq!(sink.pushes, [(ConnectionId(2), "hello\n".to_string())]);
    }

    #[tokio::test]
    async fn unsubscribed_connection_is_not_written_to() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 10, 60).unwrap();
        s.subscribe("q", ConnectionId(7)).unwrap();
        sink.broken.insert(ConnectionId(7));

        assert_eq!(s.unsubscribe(ConnectionId(7)), Some("q".to_string()));
        assert_eq!(s.unsubscribe(ConnectionId(7)), None);

        s.publish("q", "after-close", &mut sink).await.unwrap();
        assert_eq!(s.get("q").unwrap().subscriber_count(), 0);
    }

    #[test]
    fn one_subscription_per_connection() {
        let mut s = store();
        s.create_queue("a", 1, 1).unwrap();
        s.create_queue("b", 1, 1).unwrap();
        s.subscribe("a", ConnectionId(1)).unwrap();

        assert_eq!(
            s.subscribe("b", ConnectionId(1)),
            Err(StoreError::AlreadySubscribed(ConnectionId(1), "a".into()))
        );
        assert_eq!(s.subscribe("missing", ConnectionId(2)), Err(StoreError::NotFound("missing".into())));
    }

    #[test]
    fn subscriber_limit_is_reported() {
        let mut s = QueueStore::new(StoreLimits {
            max_subscribers: 1,
            ..StoreLimits::default()
        });
        s.create_queue("q", 1, 1).unwrap();
        s.subscribe("q", ConnectionId(1)).unwrap();
        assert_eq!(
            s.subscribe("q", ConnectionId(2)),
            Err(StoreError::SubscriberLimitReached("q".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_frees_capacity_after_ttl() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 1, 5).unwrap();
        s.publish("q", "first", &mut sink).await.unwrap();

        tokio::time::advance(Duration::from_millis(4_900)).await;
        assert_eq!(s.backlog("q", Instant::now()).unwrap(), ["first\n"]);
        assert_eq!(s.sweep_expired(Instant::now()), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(s.backlog("q", Instant::now()).unwrap().is_empty());
        assert_eq!(s.sweep_expired(Instant::now()), 1);
        assert_eq!(s.get("q").unwrap().len(), 0);

        s.publish("q", "second", &mut sink).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn publish_expires_lazily_before_capacity_check() {
        let mut s = store();
        let mut sink = RecordingSink::default();
        s.create_queue("q", 1, 1).unwrap();
        s.publish("q", "old", &mut sink).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        s.publish("q", "new", &mut sink).await.unwrap();
        assert_eq!(s.backlog("q", Instant::now()).unwrap(), ["new\n"]);
    }
}

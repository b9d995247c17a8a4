//! Typed, in-process, fan-out publish/subscribe primitive.
//!
//! Each subscriber gets its own bounded `mpsc` channel rather than sharing a
//! single `broadcast` channel, so a full queue drops that one subscriber's
//! message independently instead of lagging every subscriber together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Bounded per-subscriber queue capacity.
pub const QUEUE_CAPACITY: usize = 64;

/// One delivered message: the publisher's event-type tag plus payload.
#[derive(Debug, Clone)]
pub struct Event<T> {
    pub event_type: String,
    pub payload: T,
}

struct Inner<T> {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<Event<T>>>>,
    next_id: AtomicU64,
}

/// A generic fan-out broker. Cheaply `Clone`d (an `Arc` handle).
pub struct Broker<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Broker {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Broker<T> {
    pub fn new() -> Self {
        Broker {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber. When `cancel` is cancelled, the broker
    /// removes the subscriber's entry and its queue closes (further `recv`
    /// calls return `None`).
    pub async fn subscribe(&self, cancel: CancellationToken) -> Subscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        self.inner.subscribers.write().await.insert(id, tx);

        let inner = self.inner.clone();
        let cleanup_cancel = cancel.clone();
        tokio::spawn(async move {
            cleanup_cancel.cancelled().await;
            inner.subscribers.write().await.remove(&id);
        });

        Subscription { id, rx }
    }

    /// Non-blocking fan-out. A subscriber whose queue is full silently
    /// drops this event; the publisher never blocks on a slow consumer.
    /// A no-op once every subscriber has left.
    pub async fn publish(&self, event_type: impl Into<String>, payload: T) {
        let event_type = event_type.into();
        let subscribers = self.inner.subscribers.read().await;
        for tx in subscribers.values() {
            let _ = tx.try_send(Event {
                event_type: event_type.clone(),
                payload: payload.clone(),
            });
        }
    }

    /// Number of currently-registered subscribers. Test/observability hook.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}

/// A live subscription's receive half.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<Event<T>>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<Event<T>> {
        self.rx.recv().await
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn subscriber_observes_events_published_after_subscription_in_order() {
        let broker: Broker<i32> = Broker::new();
        let mut sub = broker.subscribe(CancellationToken::new()).await;

        broker.publish("tick", 1).await;
        broker.publish("tick", 2).await;
        broker.publish("tick", 3).await;

        assert_eq!(sub.recv().await.unwrap().payload, 1);
        assert_eq!(sub.recv().await.unwrap().payload, 2);
        assert_eq!(sub.recv().await.unwrap().payload, 3);
    }

    #[tokio::test]
    async fn full_queue_drops_silently_without_blocking_publisher() {
        let broker: Broker<i32> = Broker::new();
        let mut sub = broker.subscribe(CancellationToken::new()).await;

        for i in 0..(QUEUE_CAPACITY as i32 + 10) {
            broker.publish("tick", i).await;
        }

        // First QUEUE_CAPACITY events survive; the rest were dropped.
        for expected in 0..QUEUE_CAPACITY as i32 {
            assert_eq!(sub.recv().await.unwrap().payload, expected);
        }
        // No more queued — the late events were dropped, not buffered.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), sub.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn slow_consumer_does_not_affect_other_subscribers() {
        let broker: Broker<i32> = Broker::new();
        let mut slow = broker.subscribe(CancellationToken::new()).await;
        let mut fast = broker.subscribe(CancellationToken::new()).await;

        for i in 0..(QUEUE_CAPACITY as i32 + 5) {
            broker.publish("tick", i).await;
        }
        // fast consumer drains immediately, unaffected by slow's backlog.
        assert_eq!(fast.recv().await.unwrap().payload, 0);
        drop(slow);
    }

    #[tokio::test]
    async fn cancelling_subscription_context_removes_it_and_closes_queue() {
        let broker: Broker<i32> = Broker::new();
        let cancel = CancellationToken::new();
        let mut sub = broker.subscribe(cancel.clone()).await;
        assert_eq!(broker.subscriber_count().await, 1);

        cancel.cancel();
        // Give the cleanup task a chance to run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(broker.subscriber_count().await, 0);
        assert!(sub.recv().await.is_none());
        // Further reads keep yielding the closed signal, not a panic.
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_everyone_left_is_a_no_op() {
        let broker: Broker<i32> = Broker::new();
        let cancel = CancellationToken::new();
        let sub = broker.subscribe(cancel.clone()).await;
        drop(sub);
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker.publish("tick", 1).await;
        assert_eq!(broker.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn independent_subscribers_each_get_their_own_fifo_queue() {
        let broker: Broker<&'static str> = Broker::new();
        let mut a = broker.subscribe(CancellationToken::new()).await;
        let mut b = broker.subscribe(CancellationToken::new()).await;

        broker.publish("evt", "hello").await;

        assert_eq!(a.recv().await.unwrap().payload, "hello");
        assert_eq!(b.recv().await.unwrap().payload, "hello");
    }
}

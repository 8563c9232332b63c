//! Lifecycle event broadcaster.
//!
//! Single-process fan-out of new orders to live per-shop subscribers. Each
//! subscriber owns a bounded mailbox; publishing never waits: a full mailbox
//! drops the new event for that subscriber only, and the drop is logged.
//! Dropping a [`Subscription`] closes and removes its mailbox.

pub mod nats;

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::events::OrderEvent;
pub use nats::NatsMirror;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

struct Mailbox {
    shop_id: i64,
    tx: mpsc::Sender<OrderEvent>,
}

struct Inner {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, Mailbox>>,
    capacity: usize,
    mirror: Option<NatsMirror>,
}

/// Cheap to clone; all clones share one subscriber set.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Also forward every published event to NATS.
    pub fn with_mirror(capacity: usize, mirror: NatsMirror) -> Self {
        Self::build(capacity, Some(mirror))
    }

    fn build(capacity: usize, mirror: Option<NatsMirror>) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                mirror,
            }),
        }
    }

    pub fn subscribe(&self, shop_id: i64) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.write().insert(id, Mailbox { shop_id, tx });
        tracing::debug!(subscriber = id, shop_id, "event subscriber attached");
        Subscription { id, shop_id, rx, hub: self.clone() }
    }

    pub fn unsubscribe(&self, subscriber: u64) {
        if let Some(mailbox) = self.write().remove(&subscriber) {
            tracing::debug!(subscriber, shop_id = mailbox.shop_id, "event subscriber detached");
        }
    }

    /// Deliver `event` to every subscriber of its shop. Returns how many
    /// mailboxes accepted it.
    pub fn publish(&self, event: OrderEvent) -> usize {
        let shop_id = event.shop_id();
        let mut delivered = 0;
        {
            let subscribers = self.read();
            for (id, mailbox) in subscribers.iter().filter(|(_, m)| m.shop_id == shop_id) {
                match mailbox.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = id, shop_id, order_id = event.order_id(), "subscriber mailbox full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(subscriber = id, shop_id, "subscriber mailbox closed");
                    }
                }
            }
        }
        if let Some(mirror) = &self.inner.mirror {
            mirror.forward(&event);
        }
        delivered
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Mailbox>> {
        self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Mailbox>> {
        self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

/// A live subscription. Events arrive in publish order.
pub struct Subscription {
    id: u64,
    shop_id: i64,
    rx: mpsc::Receiver<OrderEvent>,
    hub: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> u64 { self.id }
    pub fn shop_id(&self) -> i64 { self.shop_id }

    pub async fn recv(&mut self) -> Option<OrderEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OrderEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = OrderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Order;
    use crate::domain::pricing::PricedBasket;
    use crate::domain::value_objects::Money;
    use futures::StreamExt;

    fn subscriber_count(hub: &Broadcaster, shop_id: i64) -> usize {
        hub.read().values().filter(|m| m.shop_id == shop_id).count()
    }

    fn order(shop_id: i64) -> Order {
        Order::create(123, shop_id, 0, "", PricedBasket { items: vec![], total: Money::zero() })
    }

    fn order_id(event: Option<OrderEvent>) -> Option<i64> {
        event.map(|e| e.order_id())
    }

    #[tokio::test]
    async fn test_fan_out_is_scoped_to_shop() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe(456);
        let mut b = hub.subscribe(456);
        let mut c = hub.subscribe(999);

        let o = order(456);
        assert_eq!(hub.publish(OrderEvent::NewOrder(o.clone())), 2);

        let got = a.recv().await.unwrap();
        assert_eq!(got.name(), "new_order");
        assert_eq!(got.order_id(), o.id);
        assert_eq!(order_id(b.recv().await), Some(o.id));
        assert!(c.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_only_for_that_subscriber() {
        let hub = Broadcaster::new(1);
        let mut a = hub.subscribe(456);
        let mut b = hub.subscribe(456);

        let first = order(456);
        let second = order(456);
        hub.publish(OrderEvent::NewOrder(first.clone()));
        assert_eq!(order_id(b.recv().await), Some(first.id));

        // a never drained its mailbox
        assert_eq!(hub.publish(OrderEvent::NewOrder(second.clone())), 1);
        assert_eq!(order_id(b.recv().await), Some(second.id));
        assert_eq!(order_id(a.recv().await), Some(first.id));
        assert!(a.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = Broadcaster::new(16);
        let sub = hub.subscribe(1);
        let orders: Vec<Order> = (0..5).map(|_| order(1)).collect();
        for o in &orders {
            hub.publish(OrderEvent::NewOrder(o.clone()));
        }
        let seen: Vec<i64> = sub.take(5).map(|e| e.order_id()).collect().await;
        assert_eq!(seen, orders.iter().map(|o| o.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = Broadcaster::default();
        let sub = hub.subscribe(7);
        assert_eq!(subscriber_count(&hub, 7), 1);
        drop(sub);
        assert_eq!(subscriber_count(&hub, 7), 0);
        assert_eq!(hub.publish(OrderEvent::NewOrder(order(7))), 0);
    }
}

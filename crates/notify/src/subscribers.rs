//! Subscriber registries for pub/sub fan-out
//!
//! Each registry keeps an ordered list of subscriber channels. Publishing
//! delivers to every live subscriber in registration order and drops the ones
//! whose receiving side has gone away. A replaying registry also remembers the
//! last published value and hands it to new subscribers first.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Registry<T> {
    latest: Option<T>,
    entries: Vec<(SubscriptionId, mpsc::UnboundedSender<T>)>,
}

/// Multicast registry of subscribers for one stream of values
pub struct Subscribers<T> {
    /// Stream name used in logs
    name: &'static str,
    replay: bool,
    registry: RwLock<Registry<T>>,
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    /// Registry without replay: subscribers only see values published later
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            replay: false,
            registry: RwLock::new(Registry {
                latest: None,
                entries: Vec::new(),
            }),
        }
    }

    /// Registry that replays the latest value to each new subscriber
    pub fn with_replay(name: &'static str, initial: T) -> Self {
        Self {
            name,
            replay: true,
            registry: RwLock::new(Registry {
                latest: Some(initial),
                entries: Vec::new(),
            }),
        }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();

        let mut registry = self.registry.write().await;
        if self.replay {
            if let Some(latest) = registry.latest.as_ref() {
                let _ = tx.send(latest.clone());
            }
        }
        registry.entries.push((id, tx));

        tracing::debug!(
            stream = self.name,
            subscription_id = %id.0,
            subscribers = registry.entries.len(),
            "Subscriber added"
        );

        Subscription { id, rx }
    }

    /// Remove a subscriber by handle
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write().await;
        let before_len = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        before_len != registry.entries.len()
    }

    /// Deliver a value to every live subscriber, in registration order
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, value: T) -> usize {
        let mut registry = self.registry.write().await;
        let mut delivered = 0;
        let mut dropped = 0;

        registry.entries.retain(|(_, tx)| {
            if tx.send(value.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                dropped += 1;
                false
            }
        });

        if self.replay {
            registry.latest = Some(value);
        }

        if dropped > 0 {
            tracing::debug!(
                stream = self.name,
                dropped,
                remaining = registry.entries.len(),
                "Removed closed subscriptions"
            );
        }

        delivered
    }

    /// Last published value (replaying registries only)
    pub async fn latest(&self) -> Option<T> {
        self.registry.read().await.latest.clone()
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.entries.len()
    }
}

/// Receiving side of a subscription
///
/// Dropping it unsubscribes on the next publish. Values are buffered without
/// limit until received, so a subscription that is kept but never read keeps
/// growing; drop it when the values are no longer needed.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next value; `None` once the publisher is gone
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

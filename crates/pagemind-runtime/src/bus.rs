//! Best-effort notification fan-out.
//!
//! The bus is a registry of subscriber handles. Publishing delivers to each
//! registered handle in turn; a handle that fails (or panics) is skipped and
//! never affects the publisher or the remaining subscribers. Handles whose
//! receiving side is gone are pruned. Nothing is buffered for subscribers
//! that register later.

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::Notification;

/// Why a delivery did not happen
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The subscriber no longer exists; it will be removed
    #[error("subscriber closed")]
    Closed,
    /// The subscriber refused this notification but stays registered
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// A listener registered on the bus
pub trait Subscriber: Send + Sync {
    /// Hand one notification to the listener. Must not block or call back
    /// into the component that is publishing.
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Subscriber backed by an unbounded channel
struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Identifier of a registered subscriber
type SubscriberId = Uuid;

/// Receiving end of a channel subscription. Once dropped, it is pruned on
/// the next publish.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Subscription {
    /// Wait for the next notification. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take a notification if one is already queued
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

/// A cloneable registry of notification subscribers.
#[derive(Clone, Default)]
pub struct NotificationBus {
    subscribers: Arc<Mutex<Vec<(SubscriberId, Arc<dyn Subscriber>)>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber handle
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.lock().push((Uuid::new_v4(), subscriber));
    }

    /// Register a channel-backed listener and return its receiving end
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(Arc::new(ChannelSubscriber { tx }));
        Subscription { rx }
    }

    /// Deliver a notification to every subscriber. Returns how many accepted it.
    pub fn publish(&self, notification: &Notification) -> usize {
        // Snapshot so subscribers run without the registry lock held.
        let snapshot: Vec<_> = self.subscribers.lock().clone();
        if snapshot.is_empty() {
            tracing::trace!(?notification, "No subscribers for notification");
            return 0;
        }

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber.deliver(notification)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(DeliveryError::Closed)) => closed.push(*id),
                Ok(Err(e)) => tracing::debug!("Subscriber {} skipped notification: {}", id, e),
                Err(_) => tracing::warn!("Subscriber {} panicked during delivery", id),
            }
        }

        if !closed.is_empty() {
            self.subscribers
                .lock()
                .retain(|(id, _)| !closed.contains(id));
            tracing::trace!("Pruned {} closed subscribers", closed.len());
        }

        delivered
    }
}

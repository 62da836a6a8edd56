//! Fan-out of topology events to connected clients
//!
//! Each subscriber owns a bounded queue. Broadcasting never waits on a
//! subscriber: a closed queue removes the subscriber, a full one only loses
//! that event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

use super::events::TopologyEvent;

pub type SubscriberId = u64;

const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct TopologyHub {
    subscribers: Arc<Mutex<HashMap<SubscriberId, mpsc::Sender<TopologyEvent>>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for TopologyHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl TopologyHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    pub async fn register(&self) -> (SubscriberId, mpsc::Receiver<TopologyEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(id, tx);
        info!("subscriber {id} connected, {} total", subscribers.len());

        (id, rx)
    }

    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(&id).is_some();
        if removed {
            info!("subscriber {id} disconnected, {} total", subscribers.len());
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Deliver to every live subscriber; returns how many received the event
    pub async fn broadcast(&self, event: &TopologyEvent) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("subscriber {id} is not keeping up, dropping {}", event.kind());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            subscribers.remove(&id);
            debug!("dropped closed subscriber {id}");
        }

        trace!("{} delivered to {delivered} subscribers", event.kind());
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::DiscoverySummary;

    fn devices_updated() -> TopologyEvent {
        TopologyEvent::DevicesUpdated(DiscoverySummary::default())
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed() {
        let hub = TopologyHub::default();
        let (_a, mut rx_a) = hub.register().await;
        let (_b, rx_b) = hub.register().await;
        drop(rx_b);

        let delivered = hub.broadcast(&devices_updated()).await;

        assert_eq!(delivered, 1);
        assert_eq!(hub.subscriber_count().await, 1);
        assert_eq!(rx_a.recv().await, Some(devices_updated()));
    }

    #[tokio::test]
    async fn test_full_subscriber_is_kept() {
        let hub = TopologyHub::new(1);
        let (_id, mut rx) = hub.register().await;

        assert_eq!(hub.broadcast(&devices_updated()).await, 1);
        assert_eq!(hub.broadcast(&devices_updated()).await, 0);
        assert_eq!(hub.subscriber_count().await, 1);

        rx.recv().await.unwrap();
        assert_eq!(hub.broadcast(&devices_updated()).await, 1);
    }

    #[tokio::test]
    async fn test_unregister() {
        let hub = TopologyHub::default();
        let (id, _rx) = hub.register().await;

        assert!(hub.unregister(id).await);
        assert!(!hub.unregister(id).await);
        assert_eq!(hub.broadcast(&devices_updated()).await, 0);
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use domtray_app_core::{EventSender, EventSource, SubscriptionId};
use domtray_core::DomainEvent;
use tracing::debug;

/// Fans published events out to every subscribed kernel queue.
#[derive(Debug, Default)]
pub struct ChannelEventSource {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, EventSender>>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many subscribers received the event. Closed queues are dropped.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|id, sender| {
            let delivered = sender.push(event.clone());
            if !delivered {
                debug!(subscription = id, "dropping closed subscriber");
            }
            delivered
        });
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl EventSource for ChannelEventSource {
    fn subscribe(&self, sender: EventSender) -> anyhow::Result<SubscriptionId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().insert(id, sender);
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().unwrap().remove(&id.0);
    }
}

//! Best-effort status fan-out.
//!
//! Each subscriber holds a bounded channel; a publish that would block is
//! dropped for that subscriber so slow consumers never backpressure the
//! pipeline worker.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Per-subscriber buffer depth.
pub const SUBSCRIBER_BUFFER: usize = 16;

/// One convergence status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub inode: u64,
    pub name: String,
    /// Current UI label for the path.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub child_total_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub child_stable_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dir_total_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dir_synced_size: Option<i64>,
}

impl SyncEvent {
    /// Plain status update without directory extras.
    #[must_use]
    pub fn status(inode: u64, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            kind: "status".to_owned(),
            inode,
            name: name.into(),
            status: status.into(),
            child_total_count: None,
            child_stable_count: None,
            dir_total_size: None,
            dir_synced_size: None,
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    subscribers: HashMap<u64, SyncSender<SyncEvent>>,
}

/// Publish/subscribe bus delivering [`SyncEvent`]s to external consumers.
#[derive(Debug, Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; returns its id (for deregistration) and the
    /// receiving end of its bounded buffer.
    pub fn subscribe(&self) -> (u64, Receiver<SyncEvent>) {
        let (tx, rx) = sync_channel(SUBSCRIBER_BUFFER);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.remove(&id);
    }

    /// Deliver to every subscriber without blocking. Full buffers drop the
    /// event; disconnected receivers are pruned.
    pub fn publish(&self, event: &SyncEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut disconnected = Vec::new();
        for (&id, tx) in &state.subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => disconnected.push(id),
            }
        }
        for id in disconnected {
            state.subscribers.remove(&id);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let (_id_a, rx_a) = bus.subscribe();
        let (_id_b, rx_b) = bus.subscribe();

        bus.publish(&SyncEvent::status(7, "doc.txt", "synced"));

        let event = rx_a.try_recv().expect("subscriber a receives");
        assert_eq!(event.inode, 7);
        assert_eq!(event.status, "synced");
        assert!(rx_b.try_recv().is_ok(), "subscriber b receives");
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, rx) = bus.subscribe();
        bus.unsubscribe(id);
        bus.publish(&SyncEvent::status(1, "x", "archived"));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn slow_subscriber_loses_events_without_blocking() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();

        for i in 0..(SUBSCRIBER_BUFFER + 10) {
            bus.publish(&SyncEvent::status(i as u64, "x", "syncing"));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER, "overflow events are dropped");
    }

    #[test]
    fn dropped_receiver_is_pruned_on_publish() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe();
        drop(rx);
        bus.publish(&SyncEvent::status(1, "x", "archived"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn event_serialization_shape() {
        let mut event = SyncEvent::status(7, "docs", "synced");
        event.child_total_count = Some(3);
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"childTotalCount\":3"));
        assert!(!json.contains("dirTotalSize"), "absent extras are omitted");
    }
}

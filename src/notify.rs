use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PrincipalId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-owner broadcast of committed events.
pub struct NotifyHub {
    channels: DashMap<PrincipalId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for bookings of `owner`. Creates the channel if needed.
    pub fn subscribe(&self, owner: PrincipalId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(owner)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, owner: PrincipalId, event: &Event) {
        if let Some(sender) = self.channels.get(&owner) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose receivers have all gone away.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
        before - self.channels.len()
    }
}

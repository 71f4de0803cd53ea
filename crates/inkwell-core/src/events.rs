//! Push events for UI subscribers.
//!
//! Every panel subscribes to one broadcast channel; a lagging subscriber
//! drops old events instead of blocking the orchestrator.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::PageError;
use crate::models::{ConflictInfo, PageKey, PageSyncStatus, SyncResult};
use crate::network::NetworkStatus;

const EVENT_CAPACITY: usize = 1000;

/// Events emitted while syncing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A page of a batch reached a terminal state
    SyncProgress {
        account_id: String,
        current: usize,
        total: usize,
    },
    SyncComplete {
        account_id: String,
        result: SyncResult,
    },
    /// A page sync failed; the batch continues
    SyncError { account_id: String, error: PageError },
    NetworkStatusChange { status: NetworkStatus },
    ConflictDetected { info: Box<ConflictInfo> },
    PageStatus { key: PageKey, status: PageSyncStatus },
    /// An account was connected, disconnected, or needs reauthorization
    AccountChanged { account_id: String, connected: bool },
}

/// Multi-subscriber event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Deliver to current subscribers; events with no listener are dropped.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectionType;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(SyncEvent::SyncProgress {
            account_id: "a1".to_string(),
            current: 1,
            total: 3,
        });

        assert_eq!(first.recv().await.unwrap(), second.recv().await.unwrap());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn emit_without_subscribers_is_ignored() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::AccountChanged {
            account_id: "a1".to_string(),
            connected: false,
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SyncEvent::NetworkStatusChange {
            status: NetworkStatus::online(ConnectionType::Wifi),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "network_status_change");
        assert_eq!(json["status"]["connection_type"], "wifi");
        assert_eq!(json["status"]["online"], true);
    }
}

//! Connectivity tracking and sync gating.
//!
//! The monitor holds the latest [`NetworkStatus`] in a watch channel. The
//! orchestrator asks [`NetworkMonitor::allows`] before every batch or page
//! sync and parks deferred work until the status permits it again.

mod probe;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use probe::{classify_interfaces, SystemProbe};

use crate::events::{EventBus, SyncEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    Unknown,
}

impl ConnectionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Ethernet => "ethernet",
            Self::Unknown => "unknown",
        }
    }
}

/// What started a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A user-initiated single-page commit
    Manual,
    /// Auto-commit, "sync now" batches, startup sync
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub online: bool,
    pub connection_type: ConnectionType,
}

impl NetworkStatus {
    pub const fn online(connection_type: ConnectionType) -> Self {
        Self {
            online: true,
            connection_type,
        }
    }

    pub const fn offline() -> Self {
        Self {
            online: false,
            connection_type: ConnectionType::Unknown,
        }
    }

    /// Whether a sync started by `trigger` may run now.
    ///
    /// With `wifi_only`, any non-WiFi connection counts as offline for
    /// automatic work. Manual commits only need some connection.
    pub const fn allows(&self, trigger: SyncTrigger, wifi_only: bool) -> bool {
        if !self.online {
            return false;
        }
        match trigger {
            SyncTrigger::Manual => true,
            SyncTrigger::Automatic => {
                !wifi_only || matches!(self.connection_type, ConnectionType::Wifi)
            }
        }
    }
}

/// Source of connectivity readings
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> NetworkStatus;
}

pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
    wifi_only: AtomicBool,
    events: EventBus,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus, wifi_only: bool, events: EventBus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            wifi_only: AtomicBool::new(wifi_only),
            events,
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn wifi_only(&self) -> bool {
        self.wifi_only.load(Ordering::SeqCst)
    }

    /// Change the WiFi-only preference and wake anything waiting on it.
    pub fn set_wifi_only(&self, wifi_only: bool) {
        if self.wifi_only.swap(wifi_only, Ordering::SeqCst) != wifi_only {
            tracing::info!("WiFi-only sync {}", if wifi_only { "enabled" } else { "disabled" });
            self.tx.send_modify(|_| {});
        }
    }

    /// Record a new reading; returns whether it differed from the last one.
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network status changed: online={} type={}",
                status.online,
                status.connection_type.as_str()
            );
            self.events.emit(SyncEvent::NetworkStatusChange { status });
        }
        changed
    }

    pub fn allows(&self, trigger: SyncTrigger) -> bool {
        self.status().allows(trigger, self.wifi_only())
    }

    /// Receiver that wakes on every status or preference change
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }

    /// Poll `probe` every `interval` until the monitor is dropped.
    pub fn spawn_polling(
        self: &Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = probe.probe().await;
                let Some(monitor) = monitor.upgrade() else {
                    tracing::debug!("Network monitor dropped; stopping probe");
                    return;
                };
                monitor.set_status(status);
            }
        })
    }
}

//! Debounced auto-commit scheduling and the offline deferral queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::models::{InitialSyncStrategy, PageKey};
use crate::network::SyncTrigger;

/// Collapses bursts of edits to a page into one commit.
///
/// Each touch restarts the page's quiet period; a page is emitted on the
/// output channel once it has been quiet for the whole delay.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<PageKey>,
    delay_ms: Arc<AtomicU64>,
}

impl Debouncer {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn spawn(delay: Duration) -> (Self, mpsc::UnboundedReceiver<PageKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let delay_ms = Arc::new(AtomicU64::new(millis(delay)));
        tokio::spawn(run_debouncer(rx, fired_tx, Arc::clone(&delay_ms)));
        (Self { tx, delay_ms }, fired_rx)
    }

    /// Record an edit; returns false once the worker has stopped.
    pub fn touch(&self, key: PageKey) -> bool {
        self.tx.send(key).is_ok()
    }

    /// Applies to edits recorded after the change.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(millis(delay), Ordering::Relaxed);
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

async fn run_debouncer(
    mut touches: mpsc::UnboundedReceiver<PageKey>,
    fired: mpsc::UnboundedSender<PageKey>,
    delay_ms: Arc<AtomicU64>,
) {
    let mut deadlines: HashMap<PageKey, Instant> = HashMap::new();

    loop {
        let next = deadlines.values().min().copied();
        tokio::select! {
            touch = touches.recv() => {
                let Some(key) = touch else {
                    break;
                };
                let delay = Duration::from_millis(delay_ms.load(Ordering::Relaxed));
                deadlines.insert(key, Instant::now() + delay);
            }
            () = sleep_until_next(next), if next.is_some() => {
                let now = Instant::now();
                let due: Vec<PageKey> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in due {
                    deadlines.remove(&key);
                    if fired.send(key).is_err() {
                        return;
                    }
                }
            }
        }
    }
    tracing::debug!("Auto-commit debouncer stopped");
}

async fn sleep_until_next(next: Option<Instant>) {
    if let Some(deadline) = next {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Work postponed until connectivity allows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredJob {
    Commit { key: PageKey, trigger: SyncTrigger },
    Sync {
        account_id: String,
        strategy: Option<InitialSyncStrategy>,
    },
}

impl DeferredJob {
    pub const fn trigger(&self) -> SyncTrigger {
        match self {
            Self::Commit { trigger, .. } => *trigger,
            Self::Sync { .. } => SyncTrigger::Automatic,
        }
    }
}

/// FIFO of deferred jobs without duplicates.
///
/// `drain` hands every job out exactly once.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    jobs: Mutex<VecDeque<DeferredJob>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job`; returns false when an identical job is already waiting.
    pub fn push(&self, job: DeferredJob) -> bool {
        let mut jobs = self.jobs.lock();
        if jobs.contains(&job) {
            return false;
        }
        jobs.push_back(job);
        true
    }

    /// Remove and return the jobs `allowed` accepts, keeping the rest queued.
    pub fn take_allowed(&self, allowed: impl Fn(SyncTrigger) -> bool) -> Vec<DeferredJob> {
        let mut jobs = self.jobs.lock();
        let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
            jobs.drain(..).partition(|job| allowed(job.trigger()));
        *jobs = waiting;
        ready.into()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

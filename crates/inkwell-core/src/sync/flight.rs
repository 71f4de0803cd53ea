//! Per-page single flight: a request for a page that is already syncing
//! joins the running operation instead of starting another.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::PageError;
use crate::models::{PageKey, PageOutcome};

pub type PageResult = std::result::Result<PageOutcome, PageError>;

type SharedResult = Shared<BoxFuture<'static, PageResult>>;
type FlightMap = Arc<Mutex<HashMap<PageKey, Flight>>>;

struct Flight {
    id: u64,
    result: SharedResult,
}

#[derive(Default)]
pub struct SingleFlight {
    inflight: FlightMap,
    next_id: AtomicU64,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the operation built by `start` for `key`, or join the one in flight.
    ///
    /// The operation is spawned, so it completes even when every caller goes
    /// away, and stays joinable until then. A panic inside it becomes an
    /// internal page error.
    pub async fn run<F, Fut>(&self, key: &PageKey, start: F) -> PageResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PageResult> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(key) {
                tracing::debug!("Joining in-flight sync of {}/{}", key.note_id, key.page_id);
                existing.result.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let landing = Landing {
                    inflight: Arc::clone(&self.inflight),
                    key: key.clone(),
                    id,
                };
                let operation = start();
                let handle = tokio::spawn(async move {
                    let _landing = landing;
                    operation.await
                });
                let note_id = key.note_id.clone();
                let page_id = key.page_id.clone();
                let result = async move {
                    handle.await.unwrap_or_else(|error| {
                        tracing::error!("Page sync {}/{} aborted: {}", note_id, page_id, error);
                        Err(PageError::internal(
                            &note_id,
                            &page_id,
                            format!("sync task failed: {error}"),
                        ))
                    })
                }
                .boxed()
                .shared();
                inflight.insert(
                    key.clone(),
                    Flight {
                        id,
                        result: result.clone(),
                    },
                );
                result
            }
        };

        shared.await
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Owned by the spawned operation; clears its entry when the operation
/// finishes or unwinds.
struct Landing {
    inflight: FlightMap,
    key: PageKey,
    id: u64,
}

impl Drop for Landing {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock();
        if inflight.get(&self.key).is_some_and(|flight| flight.id == self.id) {
            inflight.remove(&self.key);
        }
    }
}

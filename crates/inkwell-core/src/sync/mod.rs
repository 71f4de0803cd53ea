//! Sync orchestrator: schedules page operations and enforces concurrency.
//!
//! Operations on pages of the same (account, note) run one at a time; notes
//! run concurrently, bounded by `max_concurrent_calls` provider calls. A
//! request for a page that is already syncing joins the running operation.
//! Nothing here decides what a page needs; that is [`crate::engine`].

mod flight;
mod page;
mod scheduler;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Semaphore};

pub use flight::{PageResult, SingleFlight};
pub use scheduler::{Debouncer, DeferredJob, DeferredQueue};

use crate::config::SyncSettings;
use crate::engine::{needs_initial_strategy, passive_status, plan_initial_sync, InitialAction};
use crate::error::{PageError, PageErrorKind};
use crate::events::{EventBus, SyncEvent};
use crate::local::{ConflictArchive, LocalNoteSource};
use crate::models::{
    ConflictInfo, ConflictResolution, InitialSyncStrategy, LocalPageMeta, NoteKey, PageKey,
    PageOutcome, PageSyncStatus, RemoteFile, SyncBaseline, SyncConfig, SyncResult,
};
use crate::network::{NetworkMonitor, NetworkStatus, SyncTrigger};
use crate::providers::CloudProvider;
use crate::services::{AccountStore, SyncStateStore};
use crate::{Error, Result};

/// Page id used for errors that affect a whole note
pub const WHOLE_NOTE: &str = "*";

/// Everything the orchestrator works with
pub struct SyncContext {
    pub accounts: Arc<AccountStore>,
    pub state: SyncStateStore,
    pub local: Arc<dyn LocalNoteSource>,
    pub archive: ConflictArchive,
    pub network: Arc<NetworkMonitor>,
    pub events: EventBus,
    pub settings: SyncSettings,
}

/// Handle to the sync machinery; cheap to clone.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    accounts: Arc<AccountStore>,
    state: SyncStateStore,
    local: Arc<dyn LocalNoteSource>,
    archive: ConflictArchive,
    network: Arc<NetworkMonitor>,
    events: EventBus,
    settings: RwLock<SyncSettings>,
    note_locks: Mutex<HashMap<NoteKey, Arc<tokio::sync::Mutex<()>>>>,
    flights: SingleFlight,
    calls: Arc<Semaphore>,
    cancel_epoch: AtomicU64,
    /// Syncing, error and conflict states layered over the derived status
    overlays: Mutex<HashMap<PageKey, PageSyncStatus>>,
    conflicts: Mutex<HashMap<PageKey, ConflictInfo>>,
    deferred: DeferredQueue,
    debouncer: Debouncer,
}

/// What a batch does with one page
#[derive(Debug, Clone)]
enum PageJob {
    /// Commit of local edits; may finish without any network call
    Commit,
    /// Batch reconciliation with the cloud state from the folder listing.
    /// `listed_baseline` is the baseline seen when the listing was taken.
    Reconcile {
        cloud: Option<RemoteFile>,
        listed_baseline: Option<SyncBaseline>,
        initial: Option<InitialAction>,
    },
}

struct PlannedPage {
    page_id: String,
    cloud: Option<RemoteFile>,
    baseline: Option<SyncBaseline>,
    initial: Option<InitialAction>,
}

struct ReadyNote {
    config: SyncConfig,
    pages: Vec<PlannedPage>,
    first_pass: bool,
}

enum NotePlan {
    Ready(ReadyNote),
    NeedsStrategy(String),
}

/// Shared counters of one batch
struct BatchProgress {
    epoch: u64,
    total: usize,
    done: AtomicUsize,
    reauth: AtomicBool,
}

impl SyncOrchestrator {
    /// Start the orchestrator and its background workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(context: SyncContext) -> Self {
        let settings = context.settings.validated();
        let (debouncer, fired) = Debouncer::spawn(settings.debounce());
        context.network.set_wifi_only(settings.wifi_only);
        let status = context.network.subscribe();

        let inner = Arc::new(Inner {
            accounts: context.accounts,
            state: context.state,
            local: context.local,
            archive: context.archive,
            network: context.network,
            events: context.events,
            calls: Arc::new(Semaphore::new(settings.max_concurrent_calls)),
            settings: RwLock::new(settings),
            note_locks: Mutex::new(HashMap::new()),
            flights: SingleFlight::new(),
            cancel_epoch: AtomicU64::new(0),
            overlays: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(HashMap::new()),
            deferred: DeferredQueue::new(),
            debouncer,
        });

        spawn_auto_commits(Arc::downgrade(&inner), fired);
        spawn_deferred_drain(Arc::downgrade(&inner), status);
        Self { inner }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn settings(&self) -> SyncSettings {
        self.inner.settings.read().clone()
    }

    /// Persist new preferences and apply them to the running workers.
    ///
    /// The call limit applies from the next start.
    pub async fn update_settings(&self, settings: SyncSettings) -> Result<SyncSettings> {
        let settings = settings.validated();
        self.inner.state.save_settings(&settings).await?;
        self.inner.network.set_wifi_only(settings.wifi_only);
        self.inner.debouncer.set_delay(settings.debounce());
        *self.inner.settings.write() = settings.clone();
        Ok(settings)
    }

    /// Commit one page now (manual mode).
    ///
    /// Returns `Skipped` without any network call when the page has not
    /// changed since its last sync.
    pub async fn commit_page(&self, account_id: &str, note_id: &str, page_id: &str) -> PageResult {
        self.inner
            .commit(PageKey::new(account_id, note_id, page_id), SyncTrigger::Manual)
            .await
    }

    /// Commit one page as the auto-commit scheduler would.
    pub async fn auto_commit(&self, account_id: &str, note_id: &str, page_id: &str) -> PageResult {
        self.inner
            .commit(PageKey::new(account_id, note_id, page_id), SyncTrigger::Automatic)
            .await
    }

    /// Report a local edit; auto-commit notes schedule a debounced commit.
    ///
    /// Returns whether a commit was scheduled.
    pub async fn notify_local_change(&self, note_id: &str, page_id: &str) -> Result<bool> {
        let Some(config) = self.inner.state.note_config(note_id).await? else {
            return Ok(false);
        };
        if !config.enabled || !config.auto_commit {
            return Ok(false);
        }
        Ok(self
            .inner
            .debouncer
            .touch(PageKey::new(config.account_id, note_id, page_id)))
    }

    /// Reconcile every enabled note of an account.
    ///
    /// `strategy` is applied to notes whose first pass finds pages on both
    /// sides; without it those notes are listed in `needs_strategy` and left
    /// untouched. When connectivity does not allow it the batch is queued and
    /// `NetworkUnavailable` is returned.
    pub async fn sync_now(
        &self,
        account_id: &str,
        strategy: Option<InitialSyncStrategy>,
    ) -> Result<SyncResult> {
        self.inner.sync_account(account_id, strategy).await
    }

    /// Reconcile a single note. Unlike [`Self::sync_now`] nothing is queued
    /// when connectivity does not allow it.
    pub async fn sync_note(
        &self,
        account_id: &str,
        note_id: &str,
        strategy: Option<InitialSyncStrategy>,
    ) -> Result<SyncResult> {
        let config = self.inner.state.require_note_config(note_id).await?;
        let key = NoteKey {
            account_id: account_id.to_string(),
            note_id: note_id.to_string(),
        };
        ensure_binding(&config, &key)?;
        self.inner.network_gate(SyncTrigger::Automatic)?;
        let result = self
            .inner
            .run_batch(account_id, vec![config], strategy)
            .await?;
        if result.needs_strategy.iter().any(|id| id == note_id) {
            return Err(Error::InitialStrategyRequired {
                note_id: note_id.to_string(),
            });
        }
        Ok(result)
    }

    /// Startup sync for the default account, when there is a connected one.
    pub async fn sync_default_account(&self) -> Result<Option<SyncResult>> {
        let Some(account) = self.inner.accounts.default_account().await? else {
            return Ok(None);
        };
        if !account.connected {
            tracing::info!("Default account {} needs reauthorization; skipping startup sync", account.id);
            return Ok(None);
        }
        match self.inner.sync_account(&account.id, None).await {
            Ok(result) => Ok(Some(result)),
            Err(Error::NetworkUnavailable) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Apply the user's choice to a conflicted page.
    ///
    /// A pending conflict is consumed exactly once. Without one, the page is
    /// checked again and `NoPendingConflict` returned when it no longer
    /// diverges.
    pub async fn resolve_conflict(
        &self,
        account_id: &str,
        note_id: &str,
        page_id: &str,
        resolution: ConflictResolution,
    ) -> PageResult {
        let key = PageKey::new(account_id, note_id, page_id);
        Arc::clone(&self.inner).resolve_task(key, resolution).await
    }

    /// Conflicts waiting for a resolution, oldest page key first
    pub fn pending_conflicts(&self) -> Vec<ConflictInfo> {
        let conflicts = self.inner.conflicts.lock();
        let mut pending: Vec<ConflictInfo> = conflicts.values().cloned().collect();
        pending.sort_by(|a, b| {
            (&a.account_id, &a.note_id, &a.page_id).cmp(&(&b.account_id, &b.note_id, &b.page_id))
        });
        pending
    }

    pub fn conflict(&self, key: &PageKey) -> Option<ConflictInfo> {
        self.inner.conflicts.lock().get(key).cloned()
    }

    /// Per-page status of a note without contacting the provider.
    pub async fn page_statuses(
        &self,
        account_id: &str,
        note_id: &str,
    ) -> Result<BTreeMap<String, PageSyncStatus>> {
        let locals = self.inner.local.list_pages(note_id).await?;
        let baselines = self.inner.state.baselines_for_note(account_id, note_id).await?;
        let locals: BTreeMap<String, LocalPageMeta> = locals
            .into_iter()
            .map(|meta| (meta.page_id.clone(), meta))
            .collect();

        let overlays = self.inner.overlays.lock();
        let page_ids: BTreeSet<&String> = locals.keys().chain(baselines.keys()).collect();
        Ok(page_ids
            .into_iter()
            .map(|page_id| {
                let key = PageKey::new(account_id, note_id, page_id.as_str());
                let status = overlays.get(&key).copied().unwrap_or_else(|| {
                    passive_status(locals.get(page_id), baselines.get(page_id))
                });
                (page_id.clone(), status)
            })
            .collect())
    }

    /// Stop scheduling page operations of running batches.
    ///
    /// Operations already in flight finish and record their baselines.
    pub fn cancel(&self) {
        self.inner.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Sync cancelled");
    }

    /// Jobs waiting for connectivity
    pub fn deferred_len(&self) -> usize {
        self.inner.deferred.len()
    }
}

impl Inner {
    fn note_lock(&self, key: &NoteKey) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.note_locks.lock().entry(key.clone()).or_default())
    }

    fn network_gate(&self, trigger: SyncTrigger) -> Result<()> {
        if self.network.allows(trigger) {
            Ok(())
        } else {
            Err(Error::NetworkUnavailable)
        }
    }

    /// Queue `job` until connectivity allows it.
    fn defer(self: &Arc<Self>, job: DeferredJob) {
        let trigger = job.trigger();
        if self.deferred.push(job) {
            tracing::info!("Network unavailable; deferred sync work ({} queued)", self.deferred.len());
        }
        // The status may have flipped between the check and the push.
        if self.network.allows(trigger) {
            self.drain_deferred();
        }
    }

    fn drain_deferred(self: &Arc<Self>) {
        let jobs = self
            .deferred
            .take_allowed(|trigger| self.network.allows(trigger));
        if jobs.is_empty() {
            return;
        }
        tracing::info!("Running {} deferred sync jobs", jobs.len());
        for job in jobs {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                match job {
                    DeferredJob::Commit { key, trigger } => {
                        if let Err(error) = inner.commit(key, trigger).await {
                            tracing::warn!("Deferred commit failed: {}", error);
                        }
                    }
                    DeferredJob::Sync {
                        account_id,
                        strategy,
                    } => {
                        if let Err(error) = inner.sync_account(&account_id, strategy).await {
                            tracing::warn!("Deferred sync of account {} failed: {}", account_id, error);
                        }
                    }
                }
            });
        }
    }

    async fn commit(self: &Arc<Self>, key: PageKey, trigger: SyncTrigger) -> PageResult {
        let page_error = |error: &Error| PageError::from_error(&key.note_id, &key.page_id, error);
        let config = self
            .state
            .require_note_config(&key.note_id)
            .await
            .map_err(|error| page_error(&error))?;
        ensure_binding(&config, &key.note_key()).map_err(|error| page_error(&error))?;

        if !self.network.allows(trigger) {
            self.defer(DeferredJob::Commit {
                key: key.clone(),
                trigger,
            });
            self.settle(&key, PageSyncStatus::Pending);
            return Ok(PageOutcome::Deferred);
        }
        self.run_page(key, PageJob::Commit).await
    }

    async fn run_page(self: &Arc<Self>, key: PageKey, job: PageJob) -> PageResult {
        let inner = Arc::clone(self);
        let task_key = key.clone();
        self.flights
            .run(&key, move || inner.page_task(task_key, job))
            .await
    }

    async fn sync_account(
        self: &Arc<Self>,
        account_id: &str,
        strategy: Option<InitialSyncStrategy>,
    ) -> Result<SyncResult> {
        self.accounts.require(account_id).await?;
        if !self.network.allows(SyncTrigger::Automatic) {
            self.defer(DeferredJob::Sync {
                account_id: account_id.to_string(),
                strategy,
            });
            return Err(Error::NetworkUnavailable);
        }
        let notes = self.state.enabled_notes(account_id).await?;
        self.run_batch(account_id, notes, strategy).await
    }

    async fn run_batch(
        self: &Arc<Self>,
        account_id: &str,
        notes: Vec<SyncConfig>,
        strategy: Option<InitialSyncStrategy>,
    ) -> Result<SyncResult> {
        let provider = self.accounts.provider(account_id).await?;
        let epoch = self.cancel_epoch.load(Ordering::SeqCst);
        tracing::info!("Syncing {} notes of account {}", notes.len(), account_id);

        let plans = join_all(
            notes
                .into_iter()
                .map(|config| self.plan_note(provider.as_ref(), config, strategy)),
        )
        .await;

        let mut result = SyncResult::default();
        let mut ready = Vec::new();
        for (note_id, plan) in plans {
            match plan {
                Ok(NotePlan::Ready(note)) => ready.push(note),
                Ok(NotePlan::NeedsStrategy(note_id)) => {
                    tracing::info!("Note {} needs an initial sync strategy", note_id);
                    result.needs_strategy.push(note_id);
                }
                Err(error @ Error::ReauthRequired { .. }) => {
                    self.reauth_required(account_id).await;
                    return Err(error);
                }
                Err(error) => {
                    let error = PageError::from_error(&note_id, WHOLE_NOTE, &error);
                    tracing::warn!("Listing note {} failed: {}", note_id, error);
                    self.events.emit(SyncEvent::SyncError {
                        account_id: account_id.to_string(),
                        error: error.clone(),
                    });
                    result.errors.push(error);
                }
            }
        }

        let progress = BatchProgress {
            epoch,
            total: ready.iter().map(|note| note.pages.len()).sum(),
            done: AtomicUsize::new(0),
            reauth: AtomicBool::new(false),
        };
        let runs = join_all(
            ready
                .into_iter()
                .map(|note| self.run_note(account_id, note, &progress)),
        )
        .await;
        for run in runs {
            result.merge(run);
        }

        tracing::info!(
            "Sync of account {} finished: {} uploaded, {} downloaded, {} deleted, {} conflicts, {} errors",
            account_id,
            result.uploaded,
            result.downloaded,
            result.deleted,
            result.conflicts.len(),
            result.errors.len()
        );
        self.events.emit(SyncEvent::SyncComplete {
            account_id: account_id.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    /// List both sides of a note and decide which pages to visit.
    async fn plan_note(
        &self,
        provider: &dyn CloudProvider,
        config: SyncConfig,
        strategy: Option<InitialSyncStrategy>,
    ) -> (String, Result<NotePlan>) {
        let note_id = config.note_id.clone();
        let plan = self.list_note(provider, config, strategy).await;
        (note_id, plan)
    }

    async fn list_note(
        &self,
        provider: &dyn CloudProvider,
        config: SyncConfig,
        strategy: Option<InitialSyncStrategy>,
    ) -> Result<NotePlan> {
        let locals: BTreeMap<String, LocalPageMeta> = self
            .local
            .list_pages(&config.note_id)
            .await?
            .into_iter()
            .map(|meta| (meta.page_id.clone(), meta))
            .collect();
        let clouds = {
            let _permit = self.calls.acquire().await.map_err(|_| Error::Cancelled)?;
            provider.list_pages(&config.note_folder()).await?
        };
        let baselines = self
            .state
            .baselines_for_note(&config.account_id, &config.note_id)
            .await?;

        let initial = if needs_initial_strategy(config.is_initialized(), &locals, &clouds, &baselines)
        {
            match strategy {
                Some(strategy) => plan_initial_sync(strategy, &locals, &clouds, &baselines),
                None => return Ok(NotePlan::NeedsStrategy(config.note_id)),
            }
        } else {
            BTreeMap::new()
        };

        let page_ids: BTreeSet<&String> = locals
            .keys()
            .chain(clouds.keys())
            .chain(baselines.keys())
            .collect();
        let pages = page_ids
            .into_iter()
            .map(|page_id| PlannedPage {
                page_id: page_id.clone(),
                cloud: clouds.get(page_id).cloned(),
                baseline: baselines.get(page_id).cloned(),
                initial: initial.get(page_id).copied(),
            })
            .collect();

        Ok(NotePlan::Ready(ReadyNote {
            first_pass: !config.is_initialized(),
            config,
            pages,
        }))
    }

    async fn run_note(
        self: &Arc<Self>,
        account_id: &str,
        note: ReadyNote,
        progress: &BatchProgress,
    ) -> SyncResult {
        let note_id = note.config.note_id.clone();
        let mut result = SyncResult::default();

        for page in note.pages {
            if self.cancel_epoch.load(Ordering::SeqCst) != progress.epoch {
                tracing::info!("Stopping sync of note {} after cancellation", note_id);
                result.cancelled = true;
                break;
            }

            let key = PageKey::new(account_id, note_id.as_str(), page.page_id.as_str());
            let outcome = if progress.reauth.load(Ordering::SeqCst) {
                let error = PageError::from_error(
                    &note_id,
                    &page.page_id,
                    &Error::ReauthRequired {
                        account_id: account_id.to_string(),
                    },
                );
                self.events.emit(SyncEvent::SyncError {
                    account_id: account_id.to_string(),
                    error: error.clone(),
                });
                self.settle(&key, PageSyncStatus::Error);
                Err(error)
            } else {
                self.run_page(
                    key,
                    PageJob::Reconcile {
                        cloud: page.cloud,
                        listed_baseline: page.baseline,
                        initial: page.initial,
                    },
                )
                .await
            };

            if let Err(error) = &outcome {
                if error.kind == PageErrorKind::ReauthRequired {
                    progress.reauth.store(true, Ordering::SeqCst);
                }
            }
            result.record(&outcome);
            let current = progress.done.fetch_add(1, Ordering::SeqCst) + 1;
            self.events.emit(SyncEvent::SyncProgress {
                account_id: account_id.to_string(),
                current,
                total: progress.total,
            });
        }

        if note.first_pass && !result.cancelled && result.errors.is_empty() {
            match self.state.mark_initialized(&note_id).await {
                Ok(()) => tracing::info!("Initial sync of note {} complete", note_id),
                Err(error) => tracing::warn!("Failed to mark note {} initialized: {}", note_id, error),
            }
        }
        result
    }

    /// Record a page's settled status and publish it.
    fn settle(&self, key: &PageKey, status: PageSyncStatus) {
        {
            let mut overlays = self.overlays.lock();
            match status {
                PageSyncStatus::Syncing
                | PageSyncStatus::Error
                | PageSyncStatus::Conflict
                | PageSyncStatus::Pending => {
                    overlays.insert(key.clone(), status);
                }
                _ => {
                    overlays.remove(key);
                }
            }
        }
        self.events.emit(SyncEvent::PageStatus {
            key: key.clone(),
            status,
        });
    }

    async fn reauth_required(&self, account_id: &str) {
        if let Err(error) = self.accounts.mark_disconnected(account_id).await {
            tracing::warn!("Failed to mark account {} disconnected: {}", account_id, error);
        }
    }
}

/// Reject a page operation whose account does not own the note.
fn ensure_binding(config: &SyncConfig, key: &NoteKey) -> Result<()> {
    if config.account_id != key.account_id {
        return Err(Error::InvalidInput(format!(
            "Note {} syncs with account {}, not {}",
            config.note_id, config.account_id, key.account_id
        )));
    }
    if !config.enabled {
        return Err(Error::InvalidInput(format!(
            "Sync is disabled for note {}",
            config.note_id
        )));
    }
    Ok(())
}

fn spawn_auto_commits(inner: Weak<Inner>, mut fired: mpsc::UnboundedReceiver<PageKey>) {
    tokio::spawn(async move {
        while let Some(key) = fired.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            tokio::spawn(async move {
                if let Err(error) = inner.commit(key, SyncTrigger::Automatic).await {
                    tracing::warn!("Auto-commit failed: {}", error);
                }
            });
        }
    });
}

fn spawn_deferred_drain(inner: Weak<Inner>, mut status: watch::Receiver<NetworkStatus>) {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.drain_deferred();
        }
    });
}

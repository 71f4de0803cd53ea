//! Single-page operations run under the note lock.

use std::sync::Arc;

use super::{ensure_binding, Inner, PageJob, PageResult};
use crate::engine::{
    commit_shortcut, reconcile_page, resolution_plan, CommitShortcut, InitialAction,
    ResolutionStep, SyncAction,
};
use crate::error::PageError;
use crate::events::SyncEvent;
use crate::models::{
    ConflictInfo, ConflictResolution, ConflictSummary, FileRef, LocalPage, PageKey, PageOutcome,
    PageSyncStatus, RemoteFile, SyncBaseline, SyncConfig,
};
use crate::providers::CloudProvider;
use crate::util::{content_hash, unix_millis_now};
use crate::{Error, Result};

/// Marks a page `syncing`; forces `error` if dropped before settling.
struct SyncingGuard<'a> {
    inner: &'a Inner,
    key: &'a PageKey,
    settled: bool,
}

impl<'a> SyncingGuard<'a> {
    fn start(inner: &'a Inner, key: &'a PageKey) -> Self {
        inner.settle(key, PageSyncStatus::Syncing);
        Self {
            inner,
            key,
            settled: false,
        }
    }

    fn finish(mut self, status: PageSyncStatus) {
        self.settled = true;
        self.inner.settle(self.key, status);
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::error!(
                "Sync of {}/{} ended without a result",
                self.key.note_id,
                self.key.page_id
            );
            self.inner.settle(self.key, PageSyncStatus::Error);
        }
    }
}

impl Inner {
    pub(super) async fn page_task(self: Arc<Self>, key: PageKey, job: PageJob) -> PageResult {
        let lock = self.note_lock(&key.note_key());
        let _note = lock.lock().await;
        let syncing = SyncingGuard::start(&self, &key);

        let result = match Arc::clone(&self.calls).acquire_owned().await {
            Ok(_permit) => self.run_job(&key, job).await,
            Err(_) => Err(Error::Cancelled),
        };
        self.conclude(&key, syncing, result).await
    }

    pub(super) async fn resolve_task(
        self: Arc<Self>,
        key: PageKey,
        resolution: ConflictResolution,
    ) -> PageResult {
        let lock = self.note_lock(&key.note_key());
        let _note = lock.lock().await;
        let syncing = SyncingGuard::start(&self, &key);

        let result = match Arc::clone(&self.calls).acquire_owned().await {
            Ok(_permit) => self.resolve(&key, resolution).await,
            Err(_) => Err(Error::Cancelled),
        };
        if let Err(Error::NoPendingConflict { .. }) = &result {
            // The page is fine; only the request was wrong.
            syncing.finish(PageSyncStatus::Synced);
            return result.map_err(|error| PageError::from_error(&key.note_id, &key.page_id, &error));
        }
        self.conclude(&key, syncing, result).await
    }

    async fn conclude(
        &self,
        key: &PageKey,
        syncing: SyncingGuard<'_>,
        result: Result<PageOutcome>,
    ) -> PageResult {
        match result {
            Ok(outcome) => {
                syncing.finish(outcome.status());
                Ok(outcome)
            }
            Err(error) => {
                syncing.finish(PageSyncStatus::Error);
                if let Error::ReauthRequired { account_id } = &error {
                    self.reauth_required(account_id).await;
                }
                let page_error = PageError::from_error(&key.note_id, &key.page_id, &error);
                tracing::warn!("Sync of {} failed", page_error);
                self.events.emit(SyncEvent::SyncError {
                    account_id: key.account_id.clone(),
                    error: page_error.clone(),
                });
                Err(page_error)
            }
        }
    }

    async fn run_job(&self, key: &PageKey, job: PageJob) -> Result<PageOutcome> {
        let config = self.state.require_note_config(&key.note_id).await?;
        ensure_binding(&config, &key.note_key())?;
        let provider = self.accounts.provider(&key.account_id).await?;

        match job {
            PageJob::Commit => self.commit_job(provider.as_ref(), &config, key).await,
            PageJob::Reconcile {
                cloud,
                listed_baseline,
                initial,
            } => {
                let local = self.local.read_page(&key.note_id, &key.page_id).await?;
                let baseline = self.state.baseline(key).await?;
                // A commit landed since the listing; its cloud entry is stale.
                let cloud = if baseline == listed_baseline {
                    cloud
                } else {
                    tracing::debug!(
                        "{}/{} changed since the listing; checking the cloud again",
                        key.note_id,
                        key.page_id
                    );
                    provider.stat(&config.page_path(&key.page_id)).await?
                };
                if let (None, Some(action)) = (&baseline, initial) {
                    return self
                        .apply_initial(provider.as_ref(), &config, key, action, local, cloud)
                        .await;
                }
                self.apply(provider.as_ref(), &config, key, local, cloud, baseline)
                    .await
            }
        }
    }

    async fn commit_job(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
    ) -> Result<PageOutcome> {
        let pending = self.conflicts.lock().get(key).map(ConflictInfo::summary);
        if let Some(summary) = pending {
            tracing::debug!("{}/{} is waiting for a conflict resolution", key.note_id, key.page_id);
            return Ok(PageOutcome::Conflict(summary));
        }

        let local = self.local.read_page(&key.note_id, &key.page_id).await?;
        let baseline = self.state.baseline(key).await?;

        if let (Some(page), Some(known)) = (&local, &baseline) {
            match commit_shortcut(page.mtime, &page.content_hash(), Some(known)) {
                Some(CommitShortcut::Unchanged) => {
                    tracing::debug!("{}/{} unchanged since last sync", key.note_id, key.page_id);
                    return Ok(PageOutcome::Skipped);
                }
                Some(CommitShortcut::SameContent) => {
                    let mut touched = known.clone();
                    touched.local_mtime_at_sync = page.mtime;
                    touched.synced_at = unix_millis_now();
                    self.state.record_baseline(&touched).await?;
                    tracing::debug!("{}/{} touched without changes", key.note_id, key.page_id);
                    return Ok(PageOutcome::Skipped);
                }
                None => {}
            }
        }

        let cloud = provider.stat(&config.page_path(&key.page_id)).await?;
        self.apply(provider, config, key, local, cloud, baseline).await
    }

    /// Carry out the three-way decision for one page.
    async fn apply(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
        local: Option<LocalPage>,
        cloud: Option<RemoteFile>,
        baseline: Option<SyncBaseline>,
    ) -> Result<PageOutcome> {
        let meta = local.as_ref().map(LocalPage::meta);
        let decision = reconcile_page(meta.as_ref(), cloud.as_ref(), baseline.as_ref());
        tracing::debug!(
            "{}/{} is {}: {:?}",
            key.note_id,
            key.page_id,
            decision.status,
            decision.action
        );
        if decision.action != SyncAction::SurfaceConflict {
            self.conflicts.lock().remove(key);
        }

        match (decision.action, local, cloud) {
            (SyncAction::None, _, _) => Ok(PageOutcome::Synced),
            (SyncAction::Upload, Some(page), _) => {
                self.upload(provider, config, key, &page).await?;
                Ok(PageOutcome::Uploaded)
            }
            (SyncAction::Download, _, Some(remote)) => {
                self.download(provider, key, &remote).await?;
                Ok(PageOutcome::Downloaded)
            }
            (SyncAction::SurfaceConflict, Some(page), Some(remote)) => self
                .surface_conflict(provider, key, page, remote)
                .await
                .map(PageOutcome::Conflict),
            (SyncAction::DeleteRemote, _, Some(remote)) => {
                provider.delete_file(&FileRef::Id(remote.file_id)).await?;
                self.state.drop_baseline(key).await?;
                tracing::info!("Deleted {}/{} from the cloud", key.note_id, key.page_id);
                Ok(PageOutcome::DeletedRemote)
            }
            (SyncAction::DeleteLocal, _, _) => {
                self.local.delete_page(&key.note_id, &key.page_id).await?;
                self.state.drop_baseline(key).await?;
                tracing::info!("Deleted local {}/{}", key.note_id, key.page_id);
                Ok(PageOutcome::DeletedLocal)
            }
            (SyncAction::ForgetBaseline, _, _) => {
                self.state.drop_baseline(key).await?;
                Ok(PageOutcome::Synced)
            }
            (action, _, _) => Err(Error::InvalidInput(format!(
                "{action:?} cannot run for {}/{} with the sides present",
                key.note_id, key.page_id
            ))),
        }
    }

    /// First-pass step chosen by the initial sync strategy.
    async fn apply_initial(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
        action: InitialAction,
        local: Option<LocalPage>,
        cloud: Option<RemoteFile>,
    ) -> Result<PageOutcome> {
        match (action, local, cloud) {
            (InitialAction::Upload, Some(page), _) => {
                self.upload(provider, config, key, &page).await?;
                Ok(PageOutcome::Uploaded)
            }
            (InitialAction::Download, _, Some(remote)) => {
                self.download(provider, key, &remote).await?;
                Ok(PageOutcome::Downloaded)
            }
            (InitialAction::Adopt, Some(page), Some(remote)) => {
                let baseline = SyncBaseline::established(
                    &key.account_id,
                    &key.note_id,
                    &key.page_id,
                    &remote,
                    page.mtime,
                    Some(page.content_hash()),
                );
                self.state.record_baseline(&baseline).await?;
                Ok(PageOutcome::Adopted)
            }
            // A side vanished since the listing; fall back to the baseline-free rules.
            (_, local, cloud) => self.apply(provider, config, key, local, cloud, None).await,
        }
    }

    async fn upload(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
        page: &LocalPage,
    ) -> Result<SyncBaseline> {
        let remote = provider
            .upload_page(&config.page_path(&key.page_id), &page.content)
            .await?;
        let baseline = SyncBaseline::established(
            &key.account_id,
            &key.note_id,
            &key.page_id,
            &remote,
            page.mtime,
            Some(page.content_hash()),
        );
        tracing::debug!("Uploaded {}/{}", key.note_id, key.page_id);
        self.state.record_baseline(&baseline).await
    }

    async fn download(
        &self,
        provider: &dyn CloudProvider,
        key: &PageKey,
        remote: &RemoteFile,
    ) -> Result<SyncBaseline> {
        let bytes = provider.download_page(&remote.file_id).await?;
        tracing::debug!("Downloaded {}/{}", key.note_id, key.page_id);
        self.store_download(key, remote, &bytes).await
    }

    /// Write downloaded bytes locally and record the new baseline.
    async fn store_download(
        &self,
        key: &PageKey,
        remote: &RemoteFile,
        bytes: &[u8],
    ) -> Result<SyncBaseline> {
        let local_mtime = self
            .local
            .write_page(&key.note_id, &key.page_id, bytes)
            .await?;
        let baseline = SyncBaseline::established(
            &key.account_id,
            &key.note_id,
            &key.page_id,
            remote,
            local_mtime,
            Some(content_hash(bytes)),
        );
        self.state.record_baseline(&baseline).await
    }

    async fn surface_conflict(
        &self,
        provider: &dyn CloudProvider,
        key: &PageKey,
        page: LocalPage,
        remote: RemoteFile,
    ) -> Result<ConflictSummary> {
        let known = self.conflicts.lock().get(key).map(|info| {
            (info.local_mtime == page.mtime && info.cloud_mtime == remote.mtime)
                .then(|| info.summary())
        });
        if let Some(Some(summary)) = known {
            return Ok(summary);
        }

        let info = self.capture_conflict(provider, key, page, remote).await?;
        let summary = info.summary();
        tracing::warn!(
            "Conflict on {}/{}: local and cloud both changed since the last sync",
            key.note_id,
            key.page_id
        );
        self.conflicts.lock().insert(key.clone(), info.clone());
        self.events.emit(SyncEvent::ConflictDetected {
            info: Box::new(info),
        });
        Ok(summary)
    }

    /// Snapshot both sides of a divergent page.
    async fn capture_conflict(
        &self,
        provider: &dyn CloudProvider,
        key: &PageKey,
        page: LocalPage,
        remote: RemoteFile,
    ) -> Result<ConflictInfo> {
        let cloud_snapshot = provider.download_page(&remote.file_id).await?;
        Ok(ConflictInfo {
            account_id: key.account_id.clone(),
            note_id: key.note_id.clone(),
            page_id: key.page_id.clone(),
            local_mtime: page.mtime,
            cloud_mtime: remote.mtime,
            local_snapshot: page.content,
            cloud_snapshot,
            cloud_file: remote,
            detected_at: unix_millis_now(),
        })
    }

    async fn resolve(&self, key: &PageKey, resolution: ConflictResolution) -> Result<PageOutcome> {
        let config = self.state.require_note_config(&key.note_id).await?;
        ensure_binding(&config, &key.note_key())?;
        let provider = self.accounts.provider(&key.account_id).await?;

        let taken = self.conflicts.lock().remove(key);
        let info = match taken {
            Some(info) => info,
            None => self.redetect(provider.as_ref(), &config, key).await?,
        };

        match self
            .apply_resolution(provider.as_ref(), &config, key, &info, resolution)
            .await
        {
            Ok(outcome) => {
                tracing::info!(
                    "Resolved conflict on {}/{} with {:?}",
                    key.note_id,
                    key.page_id,
                    resolution
                );
                Ok(outcome)
            }
            Err(error) => {
                self.conflicts.lock().entry(key.clone()).or_insert(info);
                Err(error)
            }
        }
    }

    /// Check the page again when no conflict was recorded for it.
    async fn redetect(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
    ) -> Result<ConflictInfo> {
        let local = self.local.read_page(&key.note_id, &key.page_id).await?;
        let baseline = self.state.baseline(key).await?;
        let cloud = provider.stat(&config.page_path(&key.page_id)).await?;
        let meta = local.as_ref().map(LocalPage::meta);
        let decision = reconcile_page(meta.as_ref(), cloud.as_ref(), baseline.as_ref());

        match (decision.action, local, cloud) {
            (SyncAction::SurfaceConflict, Some(page), Some(remote)) => {
                self.capture_conflict(provider, key, page, remote).await
            }
            _ => Err(Error::NoPendingConflict {
                page_id: key.page_id.clone(),
            }),
        }
    }

    async fn apply_resolution(
        &self,
        provider: &dyn CloudProvider,
        config: &SyncConfig,
        key: &PageKey,
        info: &ConflictInfo,
        resolution: ConflictResolution,
    ) -> Result<PageOutcome> {
        let save_copy = self.settings.read().save_conflict_copy;

        let local = match self.local.read_page(&key.note_id, &key.page_id).await? {
            Some(page) => page,
            None => {
                let mtime = self
                    .local
                    .write_page(&key.note_id, &key.page_id, &info.local_snapshot)
                    .await?;
                LocalPage::new(key.page_id.clone(), info.local_snapshot.clone(), mtime)
            }
        };

        // The cloud copy may have moved again since detection.
        let (remote, cloud_content) = match provider.stat(&config.page_path(&key.page_id)).await? {
            Some(remote) if remote.mtime != info.cloud_mtime => {
                let bytes = provider.download_page(&remote.file_id).await?;
                (remote, bytes)
            }
            Some(remote) => (remote, info.cloud_snapshot.clone()),
            None => (info.cloud_file.clone(), info.cloud_snapshot.clone()),
        };

        let mut outcome = PageOutcome::Synced;
        for step in resolution_plan(resolution, save_copy) {
            match step {
                ResolutionStep::BackupCloud => {
                    let copy = self
                        .archive
                        .save(&key.note_id, &key.page_id, &cloud_content)
                        .await?;
                    tracing::info!("Saved cloud version to {}", copy.path.display());
                }
                ResolutionStep::BackupLocal => {
                    let copy = self
                        .archive
                        .save(&key.note_id, &key.page_id, &local.content)
                        .await?;
                    tracing::info!("Saved local version to {}", copy.path.display());
                }
                ResolutionStep::DuplicateLocal => {
                    let duplicate = self
                        .local
                        .duplicate_page(&key.note_id, &key.page_id)
                        .await?;
                    let duplicate_key = PageKey::new(
                        key.account_id.as_str(),
                        key.note_id.as_str(),
                        duplicate.page_id.as_str(),
                    );
                    let page = LocalPage::new(
                        duplicate.page_id.clone(),
                        local.content.clone(),
                        duplicate.mtime,
                    );
                    self.upload(provider, config, &duplicate_key, &page).await?;
                    tracing::info!(
                        "Kept local version of {}/{} as {}",
                        key.note_id,
                        key.page_id,
                        duplicate.page_id
                    );
                }
                ResolutionStep::UploadLocal => {
                    self.upload(provider, config, key, &local).await?;
                    outcome = PageOutcome::Uploaded;
                }
                ResolutionStep::DownloadCloud => {
                    self.store_download(key, &remote, &cloud_content).await?;
                    outcome = PageOutcome::Downloaded;
                }
            }
        }
        Ok(outcome)
    }
}

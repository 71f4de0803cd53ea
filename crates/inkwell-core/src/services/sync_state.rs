//! Sync state store: page baselines and per-note configuration.

use std::collections::BTreeMap;

use super::SharedDatabase;
use crate::config::SyncSettings;
use crate::db::{
    BaselineRepository, LibSqlBaselineRepository, LibSqlSettingsRepository,
    LibSqlSyncConfigRepository, SettingsRepository, SyncConfigRepository,
};
use crate::error::Result;
use crate::models::{PageKey, SyncBaseline, SyncConfig};
use crate::util::{normalize_remote_folder, unix_millis_now};
use crate::Error;

/// Persistent mapping from (account, note, page) to the last common baseline
///
/// Writes for one page are serialized by the orchestrator's note lock; the
/// store itself only guarantees that mtimes never move backwards.
#[derive(Clone)]
pub struct SyncStateStore {
    db: SharedDatabase,
}

impl SyncStateStore {
    pub const fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub async fn baseline(&self, key: &PageKey) -> Result<Option<SyncBaseline>> {
        let db = self.db.lock().await;
        let repo = LibSqlBaselineRepository::new(db.connection());
        repo.get(&key.account_id, &key.note_id, &key.page_id).await
    }

    /// Baselines of a note keyed by page id
    pub async fn baselines_for_note(
        &self,
        account_id: &str,
        note_id: &str,
    ) -> Result<BTreeMap<String, SyncBaseline>> {
        let db = self.db.lock().await;
        let repo = LibSqlBaselineRepository::new(db.connection());
        Ok(repo
            .list_for_note(account_id, note_id)
            .await?
            .into_iter()
            .map(|baseline| (baseline.page_id.clone(), baseline))
            .collect())
    }

    /// Record a successful sync; returns the baseline as stored.
    pub async fn record_baseline(&self, baseline: &SyncBaseline) -> Result<SyncBaseline> {
        let db = self.db.lock().await;
        let repo = LibSqlBaselineRepository::new(db.connection());
        let stored = repo.upsert(baseline).await?;
        tracing::debug!(
            "Baseline {}/{}: cloud_mtime={} local_mtime={}",
            stored.note_id,
            stored.page_id,
            stored.cloud_mtime,
            stored.local_mtime_at_sync
        );
        Ok(stored)
    }

    /// Drop the baseline of a page deleted on both sides.
    pub async fn drop_baseline(&self, key: &PageKey) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlBaselineRepository::new(db.connection());
        repo.delete(&key.account_id, &key.note_id, &key.page_id)
            .await
    }

    /// Erase every baseline and note binding of an account.
    pub async fn forget_account(&self, account_id: &str) -> Result<usize> {
        let db = self.db.lock().await;
        let baselines = LibSqlBaselineRepository::new(db.connection())
            .delete_for_account(account_id)
            .await?;
        let notes = LibSqlSyncConfigRepository::new(db.connection())
            .delete_for_account(account_id)
            .await?;
        tracing::info!(
            "Forgot account {}: {} baselines, {} note configs",
            account_id,
            baselines,
            notes
        );
        Ok(baselines)
    }

    pub async fn note_config(&self, note_id: &str) -> Result<Option<SyncConfig>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        repo.get(note_id).await
    }

    /// Configuration of a note, or `NotFound`
    pub async fn require_note_config(&self, note_id: &str) -> Result<SyncConfig> {
        self.note_config(note_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sync config for note {note_id}")))
    }

    /// Bind a note to an account and folder.
    ///
    /// Moving a note to another account or folder starts it over as a first
    /// sync; its old baselines stay with the old account.
    pub async fn configure_note(&self, config: &SyncConfig) -> Result<SyncConfig> {
        let mut config = config.clone();
        config.sync_folder = normalize_remote_folder(&config.sync_folder);

        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        if let Some(existing) = repo.get(&config.note_id).await? {
            if existing.account_id != config.account_id
                || existing.sync_folder != config.sync_folder
            {
                config.initial_sync_at = None;
            } else if config.initial_sync_at.is_none() {
                config.initial_sync_at = existing.initial_sync_at;
            }
        }
        repo.save(&config).await?;
        tracing::info!(
            "Note {} syncs to {} on account {} (enabled={}, auto_commit={})",
            config.note_id,
            config.sync_folder,
            config.account_id,
            config.enabled,
            config.auto_commit
        );
        Ok(config)
    }

    pub async fn set_auto_commit(&self, note_id: &str, auto_commit: bool) -> Result<SyncConfig> {
        let mut config = self.require_note_config(note_id).await?;
        config.auto_commit = auto_commit;
        self.configure_note(&config).await
    }

    pub async fn set_enabled(&self, note_id: &str, enabled: bool) -> Result<SyncConfig> {
        let mut config = self.require_note_config(note_id).await?;
        config.enabled = enabled;
        self.configure_note(&config).await
    }

    pub async fn remove_note(&self, note_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        repo.delete(note_id).await
    }

    /// Sync-enabled notes bound to an account
    pub async fn enabled_notes(&self, account_id: &str) -> Result<Vec<SyncConfig>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        Ok(repo
            .list_for_account(account_id)
            .await?
            .into_iter()
            .filter(|config| config.enabled)
            .collect())
    }

    pub async fn all_notes(&self) -> Result<Vec<SyncConfig>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        repo.list().await
    }

    pub async fn mark_initialized(&self, note_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncConfigRepository::new(db.connection());
        repo.mark_initialized(note_id, unix_millis_now()).await
    }

    pub async fn load_settings(&self, base: SyncSettings) -> Result<SyncSettings> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.load(base).await
    }

    pub async fn save_settings(&self, settings: &SyncSettings) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.save(settings).await
    }
}

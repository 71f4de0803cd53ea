//! Sync state models: per-note config, per-page baseline, status, conflicts

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cloud::RemoteFile;
use crate::error::PageError;
use crate::Error;

/// Per-note sync configuration, mutated only through explicit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub note_id: String,
    /// When false the engine never runs for this note
    pub enabled: bool,
    /// Auto mode commits on debounced local edits; manual mode waits for the user
    pub auto_commit: bool,
    /// Remote folder holding one sub-folder per note
    pub sync_folder: String,
    pub account_id: String,
    /// Set after the first reconciliation pass completes (Unix ms)
    pub initial_sync_at: Option<i64>,
}

impl SyncConfig {
    pub fn new(
        note_id: impl Into<String>,
        account_id: impl Into<String>,
        sync_folder: impl Into<String>,
    ) -> Self {
        Self {
            note_id: note_id.into(),
            enabled: true,
            auto_commit: false,
            sync_folder: crate::util::normalize_remote_folder(&sync_folder.into()),
            account_id: account_id.into(),
            initial_sync_at: None,
        }
    }

    /// Remote folder for this note's pages
    #[must_use]
    pub fn note_folder(&self) -> String {
        crate::util::join_remote_path(&self.sync_folder, &self.note_id)
    }

    /// Remote path of one page
    #[must_use]
    pub fn page_path(&self, page_id: &str) -> String {
        crate::util::join_remote_path(&self.note_folder(), &super::cloud::page_file_name(page_id))
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initial_sync_at.is_some()
    }
}

/// Last point at which local and cloud were known identical for a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBaseline {
    pub note_id: String,
    pub page_id: String,
    pub account_id: String,
    pub cloud_file_id: String,
    pub cloud_path: Option<String>,
    /// Cloud mtime at last sync (Unix ms)
    pub cloud_mtime: i64,
    /// Local mtime at last sync (Unix ms)
    pub local_mtime_at_sync: i64,
    pub content_hash: Option<String>,
    /// When this baseline was written (Unix ms)
    pub synced_at: i64,
}

impl SyncBaseline {
    /// Baseline after a successful transfer of `content_hash` between a local
    /// copy at `local_mtime` and `remote`.
    #[must_use]
    pub fn established(
        account_id: &str,
        note_id: &str,
        page_id: &str,
        remote: &RemoteFile,
        local_mtime: i64,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            note_id: note_id.to_string(),
            page_id: page_id.to_string(),
            account_id: account_id.to_string(),
            cloud_file_id: remote.file_id.clone(),
            cloud_path: remote.path.clone(),
            cloud_mtime: remote.mtime,
            local_mtime_at_sync: local_mtime,
            content_hash,
            synced_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Merge a newer sync into this baseline without letting either mtime go
    /// backwards.
    #[must_use]
    pub fn advanced_to(&self, next: Self) -> Self {
        Self {
            cloud_mtime: self.cloud_mtime.max(next.cloud_mtime),
            local_mtime_at_sync: self.local_mtime_at_sync.max(next.local_mtime_at_sync),
            ..next
        }
    }
}

/// Derived per-page status; recomputed, never persisted as ground truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSyncStatus {
    Synced,
    /// Local edits not yet committed (cloud state unknown)
    Pending,
    LocalNewer,
    CloudNewer,
    /// Transient; must resolve within one pass
    Syncing,
    Error,
    NotSynced,
    /// Terminal until a resolution is supplied
    Conflict,
}

impl PageSyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::LocalNewer => "local_newer",
            Self::CloudNewer => "cloud_newer",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::NotSynced => "not_synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for PageSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User choice for a conflicted page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    KeepLocal,
    KeepCloud,
    KeepBoth,
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_local" | "local" => Ok(Self::KeepLocal),
            "keep_cloud" | "cloud" => Ok(Self::KeepCloud),
            "keep_both" | "both" => Ok(Self::KeepBoth),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict resolution: {other}"
            ))),
        }
    }
}

/// One-time policy for a note's first reconciliation when both sides have pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSyncStrategy {
    UploadLocal,
    DownloadCloud,
    SmartMerge,
}

impl FromStr for InitialSyncStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "upload_local" | "upload" => Ok(Self::UploadLocal),
            "download_cloud" | "download" => Ok(Self::DownloadCloud),
            "smart_merge" | "merge" => Ok(Self::SmartMerge),
            other => Err(Error::InvalidInput(format!(
                "Unknown initial sync strategy: {other}"
            ))),
        }
    }
}

/// A three-way divergence materialized for the resolution dialog
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub account_id: String,
    pub note_id: String,
    pub page_id: String,
    pub local_mtime: i64,
    pub cloud_mtime: i64,
    pub local_snapshot: Vec<u8>,
    pub cloud_snapshot: Vec<u8>,
    /// Remote identity at detection time
    pub cloud_file: RemoteFile,
    /// Unix ms
    pub detected_at: i64,
}

impl ConflictInfo {
    #[must_use]
    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            note_id: self.note_id.clone(),
            page_id: self.page_id.clone(),
            local_mtime: self.local_mtime,
            cloud_mtime: self.cloud_mtime,
        }
    }
}

impl fmt::Debug for ConflictInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConflictInfo")
            .field("account_id", &self.account_id)
            .field("note_id", &self.note_id)
            .field("page_id", &self.page_id)
            .field("local_mtime", &self.local_mtime)
            .field("cloud_mtime", &self.cloud_mtime)
            .field("local_snapshot_len", &self.local_snapshot.len())
            .field("cloud_snapshot_len", &self.cloud_snapshot.len())
            .field("cloud_file", &self.cloud_file)
            .finish_non_exhaustive()
    }
}

/// Snapshot-free view of a conflict, used in batch results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub note_id: String,
    pub page_id: String,
    pub local_mtime: i64,
    pub cloud_mtime: i64,
}

/// What happened to one page during a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    /// Both sides unchanged since the baseline
    Synced,
    /// Manual commit found nothing to send; no network call was made
    Skipped,
    Uploaded,
    Downloaded,
    /// Baseline recorded for identical sides without any transfer
    Adopted,
    DeletedRemote,
    DeletedLocal,
    Conflict(ConflictSummary),
    /// Queued until connectivity allows it
    Deferred,
}

impl PageOutcome {
    /// Status the page settles into after this outcome
    #[must_use]
    pub const fn status(&self) -> PageSyncStatus {
        match self {
            Self::Conflict(_) => PageSyncStatus::Conflict,
            Self::Deferred => PageSyncStatus::Pending,
            _ => PageSyncStatus::Synced,
        }
    }
}

/// Aggregate of a whole-note or whole-account pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub uploaded: usize,
    pub downloaded: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: Vec<PageError>,
    pub conflicts: Vec<ConflictSummary>,
    /// Notes whose first pass needs an initial-sync strategy
    pub needs_strategy: Vec<String>,
    /// Set when cancellation stopped scheduling before all pages ran
    pub cancelled: bool,
}

impl SyncResult {
    pub fn record(&mut self, outcome: &Result<PageOutcome, PageError>) {
        match outcome {
            Ok(PageOutcome::Uploaded) => self.uploaded += 1,
            Ok(PageOutcome::Downloaded) => self.downloaded += 1,
            Ok(PageOutcome::DeletedRemote | PageOutcome::DeletedLocal) => self.deleted += 1,
            Ok(PageOutcome::Skipped) => self.skipped += 1,
            Ok(PageOutcome::Conflict(summary)) => self.conflicts.push(summary.clone()),
            Ok(PageOutcome::Synced | PageOutcome::Adopted | PageOutcome::Deferred) => {}
            Err(error) => self.errors.push(error.clone()),
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.uploaded += other.uploaded;
        self.downloaded += other.downloaded;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        self.conflicts.extend(other.conflicts);
        self.needs_strategy.extend(other.needs_strategy);
        self.cancelled |= other.cancelled;
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty() && self.needs_strategy.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageErrorKind;

    fn remote(mtime: i64) -> RemoteFile {
        RemoteFile {
            file_id: "f1".to_string(),
            path: Some("/inkwell/n1/p1.page".to_string()),
            mtime,
            size: Some(3),
        }
    }

    #[test]
    fn config_builds_page_paths() {
        let config = SyncConfig::new("n1", "acct", "apps/inkwell/");
        assert_eq!(config.sync_folder, "/apps/inkwell");
        assert_eq!(config.note_folder(), "/apps/inkwell/n1");
        assert_eq!(config.page_path("p1"), "/apps/inkwell/n1/p1.page");
    }

    #[test]
    fn advanced_baseline_never_moves_backwards() {
        let first = SyncBaseline::established("a", "n1", "p1", &remote(50), 40, None);
        let older = SyncBaseline::established("a", "n1", "p1", &remote(30), 45, None);
        let merged = first.advanced_to(older);
        assert_eq!(merged.cloud_mtime, 50);
        assert_eq!(merged.local_mtime_at_sync, 45);
    }

    #[test]
    fn parse_choices_accept_dashes() {
        assert_eq!(
            "keep-both".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::KeepBoth
        );
        assert_eq!(
            "smart-merge".parse::<InitialSyncStrategy>().unwrap(),
            InitialSyncStrategy::SmartMerge
        );
        assert!("whatever".parse::<InitialSyncStrategy>().is_err());
    }

    #[test]
    fn result_records_outcomes() {
        let mut result = SyncResult::default();
        result.record(&Ok(PageOutcome::Uploaded));
        result.record(&Ok(PageOutcome::Downloaded));
        result.record(&Ok(PageOutcome::DeletedRemote));
        result.record(&Ok(PageOutcome::Adopted));
        result.record(&Err(PageError {
            note_id: "n".to_string(),
            page_id: "p".to_string(),
            kind: PageErrorKind::Provider,
            message: "boom".to_string(),
        }));
        assert_eq!(result.uploaded, 1);
        assert_eq!(result.downloaded, 1);
        assert_eq!(result.deleted, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(!result.is_clean());
    }

    #[test]
    fn conflict_debug_hides_snapshots() {
        let info = ConflictInfo {
            account_id: "a".to_string(),
            note_id: "n".to_string(),
            page_id: "p".to_string(),
            local_mtime: 1,
            cloud_mtime: 2,
            local_snapshot: b"secret local text".to_vec(),
            cloud_snapshot: b"secret cloud text".to_vec(),
            cloud_file: remote(2),
            detected_at: 3,
        };
        let rendered = format!("{info:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("local_snapshot_len"));
    }
}

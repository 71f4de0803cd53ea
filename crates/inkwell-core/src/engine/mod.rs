//! Reconciliation engine: pure decisions over (local, cloud, baseline).
//!
//! Nothing in here performs I/O. The orchestrator gathers the three inputs
//! for a page, asks for a [`Decision`], and carries out its action.

mod initial;
mod resolution;

pub use initial::{needs_initial_strategy, plan_initial_sync, InitialAction};
pub use resolution::{resolution_plan, ResolutionStep};

use crate::models::{LocalPageMeta, PageSyncStatus, RemoteFile, SyncBaseline};

/// What the orchestrator must do for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    None,
    Upload,
    Download,
    /// Both sides moved since the baseline; the user must choose
    SurfaceConflict,
    /// Deleted locally, unchanged in the cloud
    DeleteRemote,
    /// Deleted in the cloud, unchanged locally
    DeleteLocal,
    /// Gone on both sides; the baseline has nothing left to describe
    ForgetBaseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: PageSyncStatus,
    pub action: SyncAction,
}

impl Decision {
    const fn new(status: PageSyncStatus, action: SyncAction) -> Self {
        Self { status, action }
    }
}

/// Whether the local copy moved past the baseline
pub const fn local_changed(local_mtime: i64, baseline: &SyncBaseline) -> bool {
    local_mtime > baseline.local_mtime_at_sync
}

/// Whether the cloud copy moved past the baseline
pub const fn cloud_changed(cloud_mtime: i64, baseline: &SyncBaseline) -> bool {
    cloud_mtime > baseline.cloud_mtime
}

/// Classify one page.
///
/// Without a baseline a page that exists on both sides is a conflict, never a
/// blind overwrite. With a baseline, a side "changed" when its mtime is
/// strictly greater than the one recorded at the last sync; when both changed
/// the page is a conflict.
pub fn reconcile_page(
    local: Option<&LocalPageMeta>,
    cloud: Option<&RemoteFile>,
    baseline: Option<&SyncBaseline>,
) -> Decision {
    use PageSyncStatus as Status;
    use SyncAction as Action;

    let Some(baseline) = baseline else {
        return match (local, cloud) {
            (Some(_), None) => Decision::new(Status::NotSynced, Action::Upload),
            (Some(_), Some(_)) => Decision::new(Status::Conflict, Action::SurfaceConflict),
            (None, Some(_)) => Decision::new(Status::CloudNewer, Action::Download),
            (None, None) => Decision::new(Status::Synced, Action::None),
        };
    };

    match (local, cloud) {
        (Some(local), Some(cloud)) => {
            match (
                local_changed(local.mtime, baseline),
                cloud_changed(cloud.mtime, baseline),
            ) {
                (false, false) => Decision::new(Status::Synced, Action::None),
                (true, false) => Decision::new(Status::LocalNewer, Action::Upload),
                (false, true) => Decision::new(Status::CloudNewer, Action::Download),
                (true, true) => Decision::new(Status::Conflict, Action::SurfaceConflict),
            }
        }
        (None, Some(cloud)) => {
            if cloud_changed(cloud.mtime, baseline) {
                Decision::new(Status::CloudNewer, Action::Download)
            } else {
                Decision::new(Status::LocalNewer, Action::DeleteRemote)
            }
        }
        (Some(local), None) => {
            if local_changed(local.mtime, baseline) {
                Decision::new(Status::LocalNewer, Action::Upload)
            } else {
                Decision::new(Status::CloudNewer, Action::DeleteLocal)
            }
        }
        (None, None) => Decision::new(Status::Synced, Action::ForgetBaseline),
    }
}

/// Status shown without contacting the provider.
///
/// Only the local side can be observed, so local edits read as `pending`.
pub fn passive_status(
    local: Option<&LocalPageMeta>,
    baseline: Option<&SyncBaseline>,
) -> PageSyncStatus {
    match (local, baseline) {
        (_, None) => PageSyncStatus::NotSynced,
        (None, Some(_)) => PageSyncStatus::Pending,
        (Some(local), Some(baseline)) => {
            if local_changed(local.mtime, baseline) {
                PageSyncStatus::Pending
            } else {
                PageSyncStatus::Synced
            }
        }
    }
}

/// A manual commit that can finish without any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitShortcut {
    /// Local mtime is not newer than the baseline
    Unchanged,
    /// Newer mtime but identical content; only the baseline moves
    SameContent,
}

/// Check a commit against the baseline before touching the network.
pub fn commit_shortcut(
    local_mtime: i64,
    local_hash: &str,
    baseline: Option<&SyncBaseline>,
) -> Option<CommitShortcut> {
    let baseline = baseline?;
    if !local_changed(local_mtime, baseline) {
        return Some(CommitShortcut::Unchanged);
    }
    (baseline.content_hash.as_deref() == Some(local_hash)).then_some(CommitShortcut::SameContent)
}

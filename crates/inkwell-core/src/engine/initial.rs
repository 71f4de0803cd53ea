//! First-pass planning for a note that already has pages on both sides.

use std::collections::BTreeMap;

use crate::models::{InitialSyncStrategy, LocalPageMeta, RemoteFile, SyncBaseline};

/// What the first pass does with one page that has no baseline yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialAction {
    Upload,
    Download,
    /// Same mtime on both sides: record a baseline without a transfer
    Adopt,
}

/// Whether a note's first pass has to wait for a strategy.
///
/// Only pages without a baseline count; a note with content on a single side
/// can be reconciled page by page without asking.
pub fn needs_initial_strategy(
    initialized: bool,
    local: &BTreeMap<String, LocalPageMeta>,
    cloud: &BTreeMap<String, RemoteFile>,
    baselines: &BTreeMap<String, SyncBaseline>,
) -> bool {
    if initialized {
        return false;
    }
    let unbaselined = |page_id: &String| !baselines.contains_key(page_id);
    local.keys().any(unbaselined) && cloud.keys().any(unbaselined)
}

/// Plan every page of a note that has no baseline.
///
/// Pages present on one side only are copied to the other whatever the
/// strategy. For pages present on both sides:
/// - `upload_local` overwrites the cloud copy
/// - `download_cloud` overwrites the local copy
/// - `smart_merge` keeps the side with the strictly greater mtime; equal
///   mtimes are adopted as already identical
pub fn plan_initial_sync(
    strategy: InitialSyncStrategy,
    local: &BTreeMap<String, LocalPageMeta>,
    cloud: &BTreeMap<String, RemoteFile>,
    baselines: &BTreeMap<String, SyncBaseline>,
) -> BTreeMap<String, InitialAction> {
    let mut plan = BTreeMap::new();

    for (page_id, local_meta) in local {
        if baselines.contains_key(page_id) {
            continue;
        }
        let action = match cloud.get(page_id) {
            None => InitialAction::Upload,
            Some(remote) => match strategy {
                InitialSyncStrategy::UploadLocal => InitialAction::Upload,
                InitialSyncStrategy::DownloadCloud => InitialAction::Download,
                InitialSyncStrategy::SmartMerge => {
                    match local_meta.mtime.cmp(&remote.mtime) {
                        std::cmp::Ordering::Greater => InitialAction::Upload,
                        std::cmp::Ordering::Less => InitialAction::Download,
                        std::cmp::Ordering::Equal => InitialAction::Adopt,
                    }
                }
            },
        };
        plan.insert(page_id.clone(), action);
    }

    for page_id in cloud.keys() {
        if !baselines.contains_key(page_id) && !local.contains_key(page_id) {
            plan.insert(page_id.clone(), InitialAction::Download);
        }
    }

    plan
}

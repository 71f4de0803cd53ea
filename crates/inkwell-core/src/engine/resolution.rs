//! Steps that carry out a conflict resolution.

use crate::models::ConflictResolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Archive the cloud version before it is overwritten
    BackupCloud,
    /// Archive the local version before it is overwritten
    BackupLocal,
    /// Copy the local page to a fresh page id and upload the copy
    DuplicateLocal,
    /// Upload the local content over the cloud copy
    UploadLocal,
    /// Write the cloud content over the local copy
    DownloadCloud,
}

/// Ordered steps for `resolution`.
///
/// Every step that overwrites a side runs after that side has been preserved,
/// unless conflict copies are turned off.
pub fn resolution_plan(
    resolution: ConflictResolution,
    save_conflict_copy: bool,
) -> Vec<ResolutionStep> {
    let mut steps = Vec::with_capacity(2);
    match resolution {
        ConflictResolution::KeepLocal => {
            if save_conflict_copy {
                steps.push(ResolutionStep::BackupCloud);
            }
            steps.push(ResolutionStep::UploadLocal);
        }
        ConflictResolution::KeepCloud => {
            if save_conflict_copy {
                steps.push(ResolutionStep::BackupLocal);
            }
            steps.push(ResolutionStep::DownloadCloud);
        }
        ConflictResolution::KeepBoth => {
            steps.push(ResolutionStep::DuplicateLocal);
            steps.push(ResolutionStep::DownloadCloud);
        }
    }
    steps
}

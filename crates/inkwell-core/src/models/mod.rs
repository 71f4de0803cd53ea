//! Data models for Inkwell

mod account;
mod cloud;
mod page;
mod sync_state;

pub use account::{new_account_id, ProviderKind, Quota, RemoteAccount, UserInfo};
pub use cloud::{
    page_file_name, page_id_from_file_name, CloudFolderItem, CloudNoteItem, FileRef, RemoteFile,
    PAGE_FILE_EXTENSION,
};
pub use page::{LocalPage, LocalPageMeta, NoteKey, PageKey};
pub use sync_state::{
    ConflictInfo, ConflictResolution, ConflictSummary, InitialSyncStrategy, PageOutcome,
    PageSyncStatus, SyncBaseline, SyncConfig, SyncResult,
};

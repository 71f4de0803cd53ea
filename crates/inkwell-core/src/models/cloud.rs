//! Read-only projections of provider listings

use serde::{Deserialize, Serialize};

/// Extension used for page files in the cloud layout
pub const PAGE_FILE_EXTENSION: &str = "page";

/// Provider-neutral identity of a remote file.
///
/// OneDrive addresses items by path and item id; Baidu Pan by numeric `fs_id`.
/// Both normalize to this shape so reconciliation never branches on provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Stable provider identifier (item id or fs_id)
    pub file_id: String,
    /// Full remote path, when the provider exposes one
    pub path: Option<String>,
    /// Last modification time (Unix ms)
    pub mtime: i64,
    /// Size in bytes
    pub size: Option<u64>,
}

/// How a remote file is addressed for deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Id(String),
    Path(String),
}

impl FileRef {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(value) | Self::Path(value) => value,
        }
    }
}

/// An entry from a folder browse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFolderItem {
    pub id: String,
    pub name: String,
    pub path: String,
    pub is_folder: bool,
    /// Unix ms
    pub mtime: i64,
    pub size: Option<u64>,
}

impl CloudFolderItem {
    /// Page id when this item is a page file (`<pageId>.page`)
    #[must_use]
    pub fn page_id(&self) -> Option<&str> {
        if self.is_folder {
            return None;
        }
        page_id_from_file_name(&self.name)
    }

    #[must_use]
    pub fn to_remote_file(&self) -> RemoteFile {
        RemoteFile {
            file_id: self.id.clone(),
            path: Some(self.path.clone()),
            mtime: self.mtime,
            size: self.size,
        }
    }
}

/// A note folder found under the sync folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudNoteItem {
    pub note_id: String,
    pub folder_id: String,
    pub path: String,
    /// Unix ms
    pub mtime: i64,
}

/// File name of a page in the cloud layout
#[must_use]
pub fn page_file_name(page_id: &str) -> String {
    format!("{page_id}.{PAGE_FILE_EXTENSION}")
}

/// Inverse of [`page_file_name`]
#[must_use]
pub fn page_id_from_file_name(name: &str) -> Option<&str> {
    name.strip_suffix(PAGE_FILE_EXTENSION)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
}

//! Local side of a sync: the editor's pages and the conflict-copy archive.

mod conflict_archive;
mod fs;
mod memory;

use async_trait::async_trait;

pub use conflict_archive::{ConflictArchive, ConflictCopy};
pub use fs::FsNoteStore;
pub use memory::MemoryNoteStore;

use crate::models::{LocalPage, LocalPageMeta};
use crate::{Error, Result};

/// Page storage owned by the editor
#[async_trait]
pub trait LocalNoteSource: Send + Sync {
    /// Pages of a note; an unknown note has none.
    async fn list_pages(&self, note_id: &str) -> Result<Vec<LocalPageMeta>>;

    async fn read_page(&self, note_id: &str, page_id: &str) -> Result<Option<LocalPage>>;

    /// Replace a page's content and return its new mtime (Unix ms).
    async fn write_page(&self, note_id: &str, page_id: &str, content: &[u8]) -> Result<i64>;

    /// Returns whether the page existed.
    async fn delete_page(&self, note_id: &str, page_id: &str) -> Result<bool>;

    /// Copy a page under a fresh page id.
    async fn duplicate_page(&self, note_id: &str, page_id: &str) -> Result<LocalPageMeta>;
}

/// Reject ids that could escape their directory.
pub(crate) fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let invalid = value.trim().is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidInput(format!("Invalid {kind}: {value:?}")));
    }
    Ok(())
}

/// Page id for a duplicate of `page_id`.
pub(crate) fn duplicate_page_id(page_id: &str) -> String {
    let suffix = uuid::Uuid::now_v7().simple().to_string();
    format!("{page_id}-copy-{}", &suffix[suffix.len() - 8..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_segments() {
        assert!(validate_segment("page id", "p1").is_ok());
        assert!(validate_segment("page id", "..").is_err());
        assert!(validate_segment("page id", "a/b").is_err());
        assert!(validate_segment("note id", " ").is_err());
    }

    #[test]
    fn duplicate_ids_are_distinct() {
        let first = duplicate_page_id("p1");
        let second = duplicate_page_id("p1");
        assert!(first.starts_with("p1-copy-"));
        assert_ne!(first, second);
    }
}

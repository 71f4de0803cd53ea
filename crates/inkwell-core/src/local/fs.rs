//! Filesystem-backed page store: `<root>/<noteId>/<pageId>.page`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use super::{duplicate_page_id, validate_segment, LocalNoteSource};
use crate::models::{page_file_name, page_id_from_file_name, LocalPage, LocalPageMeta};
use crate::util::content_hash;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FsNoteStore {
    root: PathBuf,
}

impl FsNoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `(note_id, page_id)` of a page file under the root.
    ///
    /// Staging files, note folders and anything nested deeper map to `None`.
    pub fn page_at(&self, path: &Path) -> Option<(String, String)> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = relative.iter();
        let note_id = parts.next()?.to_str()?;
        let file_name = parts.next()?.to_str()?;
        if parts.next().is_some() {
            return None;
        }
        let page_id = page_id_from_file_name(file_name)?;
        validate_segment("note id", note_id).ok()?;
        validate_segment("page id", page_id).ok()?;
        Some((note_id.to_string(), page_id.to_string()))
    }

    fn note_dir(&self, note_id: &str) -> Result<PathBuf> {
        validate_segment("note id", note_id)?;
        Ok(self.root.join(note_id))
    }

    fn page_path(&self, note_id: &str, page_id: &str) -> Result<PathBuf> {
        validate_segment("page id", page_id)?;
        Ok(self.note_dir(note_id)?.join(page_file_name(page_id)))
    }
}

async fn mtime_of(path: &Path) -> Result<i64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|error| Error::local_io(path, error))?;
    let modified = metadata
        .modified()
        .map_err(|error| Error::local_io(path, error))?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    Ok(i64::try_from(millis).unwrap_or(i64::MAX))
}

#[async_trait]
impl LocalNoteSource for FsNoteStore {
    async fn list_pages(&self, note_id: &str) -> Result<Vec<LocalPageMeta>> {
        let dir = self.note_dir(note_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(Error::local_io(&dir, error)),
        };

        let mut pages = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| Error::local_io(&dir, error))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(page_id) = page_id_from_file_name(&name) else {
                continue;
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            pages.push(LocalPageMeta {
                page_id: page_id.to_string(),
                mtime: mtime_of(&path).await?,
                content_hash: None,
            });
        }
        pages.sort_by(|left, right| left.page_id.cmp(&right.page_id));
        Ok(pages)
    }

    async fn read_page(&self, note_id: &str, page_id: &str) -> Result<Option<LocalPage>> {
        let path = self.page_path(note_id, page_id)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::local_io(&path, error)),
        };
        let mtime = mtime_of(&path).await?;
        Ok(Some(LocalPage::new(page_id, content, mtime)))
    }

    async fn write_page(&self, note_id: &str, page_id: &str, content: &[u8]) -> Result<i64> {
        let path = self.page_path(note_id, page_id)?;
        let dir = self.note_dir(note_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| Error::local_io(&dir, error))?;

        // Write beside the page and rename so readers never see half a page
        let staging = path.with_extension("page.tmp");
        tokio::fs::write(&staging, content)
            .await
            .map_err(|error| Error::local_io(&staging, error))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|error| Error::local_io(&path, error))?;

        tracing::debug!(
            "Wrote page {}/{} ({} bytes, {})",
            note_id,
            page_id,
            content.len(),
            &content_hash(content)[..12]
        );
        mtime_of(&path).await
    }

    async fn delete_page(&self, note_id: &str, page_id: &str) -> Result<bool> {
        let path = self.page_path(note_id, page_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(Error::local_io(&path, error)),
        }
    }

    async fn duplicate_page(&self, note_id: &str, page_id: &str) -> Result<LocalPageMeta> {
        let page = self
            .read_page(note_id, page_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("page {note_id}/{page_id}")))?;
        let copy_id = duplicate_page_id(page_id);
        let mtime = self.write_page(note_id, &copy_id, &page.content).await?;
        Ok(LocalPageMeta {
            page_id: copy_id,
            mtime,
            content_hash: Some(page.content_hash()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn page_paths_map_to_note_and_page() {
        let store = FsNoteStore::new("/data/notes");

        assert_eq!(
            store.page_at(Path::new("/data/notes/n1/p1.page")),
            Some(("n1".to_string(), "p1".to_string()))
        );
        assert_eq!(store.page_at(Path::new("/data/notes/n1/p1.page.tmp")), None);
        assert_eq!(store.page_at(Path::new("/data/notes/n1")), None);
        assert_eq!(store.page_at(Path::new("/data/notes/n1/sub/p1.page")), None);
        assert_eq!(store.page_at(Path::new("/elsewhere/n1/p1.page")), None);
    }

    #[tokio::test]
    async fn write_then_read_page() {
        let tmp = tempdir().unwrap();
        let store = FsNoteStore::new(tmp.path());

        let mtime = store.write_page("n1", "p1", b"hello").await.unwrap();
        let page = store.read_page("n1", "p1").await.unwrap().unwrap();

        assert_eq!(page.content, b"hello".to_vec());
        assert_eq!(page.mtime, mtime);
        assert!(tmp.path().join("n1").join("p1.page").is_file());
    }

    #[tokio::test]
    async fn list_pages_skips_foreign_files() {
        let tmp = tempdir().unwrap();
        let store = FsNoteStore::new(tmp.path());
        store.write_page("n1", "p2", b"two").await.unwrap();
        store.write_page("n1", "p1", b"one").await.unwrap();
        std::fs::write(tmp.path().join("n1").join("notes.txt"), "x").unwrap();

        let pages = store
            .list_pages("n1")
            .await
            .unwrap()
            .into_iter()
            .map(|page| page.page_id)
            .collect::<Vec<_>>();

        assert_eq!(pages, vec!["p1".to_string(), "p2".to_string()]);
        assert!(store.list_pages("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_duplicate() {
        let tmp = tempdir().unwrap();
        let store = FsNoteStore::new(tmp.path());
        store.write_page("n1", "p1", b"body").await.unwrap();

        let copy = store.duplicate_page("n1", "p1").await.unwrap();
        let copied = store.read_page("n1", &copy.page_id).await.unwrap().unwrap();
        assert_eq!(copied.content, b"body".to_vec());

        assert!(store.delete_page("n1", "p1").await.unwrap());
        assert!(!store.delete_page("n1", "p1").await.unwrap());
        assert!(store.read_page("n1", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_escaping_ids() {
        let tmp = tempdir().unwrap();
        let store = FsNoteStore::new(tmp.path());

        let result = store.write_page("..", "p1", b"x").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

//! In-memory page store for embedding and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{duplicate_page_id, LocalNoteSource};
use crate::models::{LocalPage, LocalPageMeta};
use crate::util::unix_millis_now;
use crate::{Error, Result};

#[derive(Default)]
struct Pages {
    by_key: BTreeMap<(String, String), LocalPage>,
    last_mtime: i64,
}

impl Pages {
    // Strictly increasing so that two writes in one millisecond still differ
    fn next_mtime(&mut self) -> i64 {
        self.last_mtime = unix_millis_now().max(self.last_mtime + 1);
        self.last_mtime
    }
}

#[derive(Clone, Default)]
pub struct MemoryNoteStore {
    pages: Arc<Mutex<Pages>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a page with an explicit mtime, as an editor save would.
    pub fn insert(&self, note_id: &str, page_id: &str, content: impl Into<Vec<u8>>, mtime: i64) {
        let mut pages = self.pages.lock();
        pages.last_mtime = pages.last_mtime.max(mtime);
        pages.by_key.insert(
            (note_id.to_string(), page_id.to_string()),
            LocalPage::new(page_id, content, mtime),
        );
    }

    pub fn page(&self, note_id: &str, page_id: &str) -> Option<LocalPage> {
        self.pages
            .lock()
            .by_key
            .get(&(note_id.to_string(), page_id.to_string()))
            .cloned()
    }

    pub fn page_ids(&self, note_id: &str) -> Vec<String> {
        self.pages
            .lock()
            .by_key
            .keys()
            .filter(|(note, _)| note == note_id)
            .map(|(_, page)| page.clone())
            .collect()
    }
}

#[async_trait]
impl LocalNoteSource for MemoryNoteStore {
    async fn list_pages(&self, note_id: &str) -> Result<Vec<LocalPageMeta>> {
        Ok(self
            .pages
            .lock()
            .by_key
            .iter()
            .filter(|((note, _), _)| note == note_id)
            .map(|(_, page)| page.meta())
            .collect())
    }

    async fn read_page(&self, note_id: &str, page_id: &str) -> Result<Option<LocalPage>> {
        Ok(self.page(note_id, page_id))
    }

    async fn write_page(&self, note_id: &str, page_id: &str, content: &[u8]) -> Result<i64> {
        let mut pages = self.pages.lock();
        let mtime = pages.next_mtime();
        pages.by_key.insert(
            (note_id.to_string(), page_id.to_string()),
            LocalPage::new(page_id, content.to_vec(), mtime),
        );
        Ok(mtime)
    }

    async fn delete_page(&self, note_id: &str, page_id: &str) -> Result<bool> {
        Ok(self
            .pages
            .lock()
            .by_key
            .remove(&(note_id.to_string(), page_id.to_string()))
            .is_some())
    }

    async fn duplicate_page(&self, note_id: &str, page_id: &str) -> Result<LocalPageMeta> {
        let page = self
            .page(note_id, page_id)
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

    #[tokio::test]
    async fn writes_advance_past_seeded_mtimes() {
        let store = MemoryNoteStore::new();
        let far_future = unix_millis_now() + 1_000_000;
        store.insert("n1", "p1", b"old".to_vec(), far_future);

        let mtime = store.write_page("n1", "p1", b"new").await.unwrap();

        assert!(mtime > far_future);
        assert_eq!(store.page("n1", "p1").unwrap().content, b"new".to_vec());
    }

    #[tokio::test]
    async fn list_is_scoped_to_note() {
        let store = MemoryNoteStore::new();
        store.insert("n1", "p1", b"a".to_vec(), 1);
        store.insert("n2", "p1", b"b".to_vec(), 1);

        let pages = store.list_pages("n1").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content_hash, Some(crate::util::content_hash(b"a")));
    }
}

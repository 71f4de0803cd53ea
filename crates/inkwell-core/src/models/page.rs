//! Local page model supplied by the editor

use serde::{Deserialize, Serialize};

use crate::util::content_hash;

/// Metadata of a local page, cheap to list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPageMeta {
    pub page_id: String,
    /// Last local modification (Unix ms)
    pub mtime: i64,
    /// SHA-256 of the content, when the source can provide it cheaply
    pub content_hash: Option<String>,
}

/// A local page with its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPage {
    pub page_id: String,
    pub content: Vec<u8>,
    /// Last local modification (Unix ms)
    pub mtime: i64,
}

impl LocalPage {
    #[must_use]
    pub fn new(page_id: impl Into<String>, content: impl Into<Vec<u8>>, mtime: i64) -> Self {
        Self {
            page_id: page_id.into(),
            content: content.into(),
            mtime,
        }
    }

    #[must_use]
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }

    #[must_use]
    pub fn meta(&self) -> LocalPageMeta {
        LocalPageMeta {
            page_id: self.page_id.clone(),
            mtime: self.mtime,
            content_hash: Some(self.content_hash()),
        }
    }
}

/// Identity of one page sync: the account context is explicit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    pub account_id: String,
    pub note_id: String,
    pub page_id: String,
}

impl PageKey {
    pub fn new(
        account_id: impl Into<String>,
        note_id: impl Into<String>,
        page_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            note_id: note_id.into(),
            page_id: page_id.into(),
        }
    }

    #[must_use]
    pub fn note_key(&self) -> NoteKey {
        NoteKey {
            account_id: self.account_id.clone(),
            note_id: self.note_id.clone(),
        }
    }
}

/// Operations within one (account, note) pair are serialized
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteKey {
    pub account_id: String,
    pub note_id: String,
}

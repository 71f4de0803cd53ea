//! Conflict copies: the discarded side of a resolution, kept on disk as
//! `<root>/<noteId>/<pageId>.<timestamp>.conflict`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::validate_segment;
use crate::util::unix_millis_now;
use crate::{Error, Result};

const CONFLICT_EXTENSION: &str = "conflict";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCopy {
    pub note_id: String,
    pub page_id: String,
    pub path: PathBuf,
    /// Unix ms
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ConflictArchive {
    root: PathBuf,
}

impl ConflictArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `content` as a conflict copy of the page.
    pub async fn save(&self, note_id: &str, page_id: &str, content: &[u8]) -> Result<ConflictCopy> {
        validate_segment("note id", note_id)?;
        validate_segment("page id", page_id)?;
        let dir = self.root.join(note_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| Error::local_io(&dir, error))?;

        let mut created_at = unix_millis_now();
        let mut path = dir.join(copy_file_name(page_id, created_at));
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            created_at += 1;
            path = dir.join(copy_file_name(page_id, created_at));
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|error| Error::local_io(&path, error))?;
        tracing::info!("Saved conflict copy of {}/{} to {}", note_id, page_id, path.display());

        Ok(ConflictCopy {
            note_id: note_id.to_string(),
            page_id: page_id.to_string(),
            path,
            created_at,
        })
    }

    /// Conflict copies of one note, oldest first.
    pub async fn list(&self, note_id: &str) -> Result<Vec<ConflictCopy>> {
        validate_segment("note id", note_id)?;
        let dir = self.root.join(note_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(Error::local_io(&dir, error)),
        };

        let mut copies = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| Error::local_io(&dir, error))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((page_id, created_at)) = parse_copy_file_name(&name) {
                copies.push(ConflictCopy {
                    note_id: note_id.to_string(),
                    page_id: page_id.to_string(),
                    path: entry.path(),
                    created_at,
                });
            }
        }
        copies.sort_by(|left, right| {
            (left.created_at, &left.page_id).cmp(&(right.created_at, &right.page_id))
        });
        Ok(copies)
    }

    pub async fn read(&self, copy: &ConflictCopy) -> Result<Vec<u8>> {
        tokio::fs::read(&copy.path)
            .await
            .map_err(|error| Error::local_io(&copy.path, error))
    }
}

fn copy_file_name(page_id: &str, created_at: i64) -> String {
    format!("{page_id}.{created_at}.{CONFLICT_EXTENSION}")
}

fn parse_copy_file_name(name: &str) -> Option<(&str, i64)> {
    let stem = name.strip_suffix(CONFLICT_EXTENSION)?.strip_suffix('.')?;
    let (page_id, timestamp) = stem.rsplit_once('.')?;
    if page_id.is_empty() {
        return None;
    }
    Some((page_id, timestamp.parse().ok()?))
}

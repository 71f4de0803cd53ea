//! Page baseline repository implementation

#![allow(clippy::cast_possible_truncation)] // row counts fit in usize

use crate::error::Result;
use crate::models::SyncBaseline;
use libsql::{params, Connection, Row};

use super::{nullable_text, optional_text};

const BASELINE_COLUMNS: &str = "account_id, note_id, page_id, cloud_file_id, cloud_path, \
     cloud_mtime, local_mtime_at_sync, content_hash, synced_at";

/// Trait for baseline storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BaselineRepository {
    /// Get the baseline of one page
    async fn get(&self, account_id: &str, note_id: &str, page_id: &str)
        -> Result<Option<SyncBaseline>>;

    /// All baselines of a note, ordered by page id
    async fn list_for_note(&self, account_id: &str, note_id: &str) -> Result<Vec<SyncBaseline>>;

    /// Insert or advance a baseline and return the stored row
    ///
    /// Both mtimes only move forward: an older write never lowers them.
    async fn upsert(&self, baseline: &SyncBaseline) -> Result<SyncBaseline>;

    /// Remove the baseline of a page that no longer exists on either side
    async fn delete(&self, account_id: &str, note_id: &str, page_id: &str) -> Result<bool>;

    /// Remove every baseline recorded under an account
    async fn delete_for_account(&self, account_id: &str) -> Result<usize>;
}

/// libSQL implementation of `BaselineRepository`
pub struct LibSqlBaselineRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBaselineRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_baseline(row: &Row) -> Result<SyncBaseline> {
        Ok(SyncBaseline {
            account_id: row.get(0)?,
            note_id: row.get(1)?,
            page_id: row.get(2)?,
            cloud_file_id: row.get(3)?,
            cloud_path: optional_text(row, 4)?,
            cloud_mtime: row.get(5)?,
            local_mtime_at_sync: row.get(6)?,
            content_hash: optional_text(row, 7)?,
            synced_at: row.get(8)?,
        })
    }
}

impl BaselineRepository for LibSqlBaselineRepository<'_> {
    async fn get(
        &self,
        account_id: &str,
        note_id: &str,
        page_id: &str,
    ) -> Result<Option<SyncBaseline>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {BASELINE_COLUMNS} FROM sync_baselines
                     WHERE account_id = ? AND note_id = ? AND page_id = ?"
                ),
                [account_id, note_id, page_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_baseline(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_for_note(&self, account_id: &str, note_id: &str) -> Result<Vec<SyncBaseline>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {BASELINE_COLUMNS} FROM sync_baselines
                     WHERE account_id = ? AND note_id = ?
                     ORDER BY page_id ASC"
                ),
                [account_id, note_id],
            )
            .await?;

        let mut baselines = Vec::new();
        while let Some(row) = rows.next().await? {
            baselines.push(Self::parse_baseline(&row)?);
        }
        Ok(baselines)
    }

    async fn upsert(&self, baseline: &SyncBaseline) -> Result<SyncBaseline> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO sync_baselines ({BASELINE_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(account_id, note_id, page_id) DO UPDATE SET
                        cloud_file_id = excluded.cloud_file_id,
                        cloud_path = excluded.cloud_path,
                        cloud_mtime = MAX(sync_baselines.cloud_mtime, excluded.cloud_mtime),
                        local_mtime_at_sync = MAX(sync_baselines.local_mtime_at_sync, excluded.local_mtime_at_sync),
                        content_hash = excluded.content_hash,
                        synced_at = excluded.synced_at"
                ),
                params![
                    baseline.account_id.as_str(),
                    baseline.note_id.as_str(),
                    baseline.page_id.as_str(),
                    baseline.cloud_file_id.as_str(),
                    nullable_text(baseline.cloud_path.as_deref()),
                    baseline.cloud_mtime,
                    baseline.local_mtime_at_sync,
                    nullable_text(baseline.content_hash.as_deref()),
                    baseline.synced_at
                ],
            )
            .await?;

        self.get(&baseline.account_id, &baseline.note_id, &baseline.page_id)
            .await?
            .ok_or_else(|| {
                crate::error::Error::Database(format!(
                    "baseline for {}/{} vanished after upsert",
                    baseline.note_id, baseline.page_id
                ))
            })
    }

    async fn delete(&self, account_id: &str, note_id: &str, page_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM sync_baselines WHERE account_id = ? AND note_id = ? AND page_id = ?",
                [account_id, note_id, page_id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn delete_for_account(&self, account_id: &str) -> Result<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM sync_baselines WHERE account_id = ?", [account_id])
            .await?;
        Ok(changed as usize)
    }
}

//! Per-note sync configuration repository

#![allow(clippy::cast_possible_truncation)] // row counts fit in usize

use crate::error::{Error, Result};
use crate::models::SyncConfig;
use libsql::{params, Connection, Row};

use super::{nullable_integer, optional_integer};

const CONFIG_COLUMNS: &str =
    "note_id, account_id, enabled, auto_commit, sync_folder, initial_sync_at";

/// Trait for note sync configuration storage (async)
#[allow(async_fn_in_trait)]
pub trait SyncConfigRepository {
    async fn get(&self, note_id: &str) -> Result<Option<SyncConfig>>;

    /// All configured notes, ordered by note id
    async fn list(&self) -> Result<Vec<SyncConfig>>;

    /// Notes bound to one account
    async fn list_for_account(&self, account_id: &str) -> Result<Vec<SyncConfig>>;

    /// Insert or replace the configuration of a note
    async fn save(&self, config: &SyncConfig) -> Result<()>;

    /// Record that the first reconciliation pass of a note finished
    async fn mark_initialized(&self, note_id: &str, at: i64) -> Result<()>;

    async fn delete(&self, note_id: &str) -> Result<bool>;

    async fn delete_for_account(&self, account_id: &str) -> Result<usize>;
}

/// libSQL implementation of `SyncConfigRepository`
pub struct LibSqlSyncConfigRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncConfigRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_config(row: &Row) -> Result<SyncConfig> {
        Ok(SyncConfig {
            note_id: row.get(0)?,
            account_id: row.get(1)?,
            enabled: row.get::<i32>(2)? != 0,
            auto_commit: row.get::<i32>(3)? != 0,
            sync_folder: row.get(4)?,
            initial_sync_at: optional_integer(row, 5)?,
        })
    }

    async fn query_configs(&self, sql: &str, key: Option<&str>) -> Result<Vec<SyncConfig>> {
        let mut rows = match key {
            Some(key) => self.conn.query(sql, [key]).await?,
            None => self.conn.query(sql, ()).await?,
        };

        let mut configs = Vec::new();
        while let Some(row) = rows.next().await? {
            configs.push(Self::parse_config(&row)?);
        }
        Ok(configs)
    }
}

impl SyncConfigRepository for LibSqlSyncConfigRepository<'_> {
    async fn get(&self, note_id: &str) -> Result<Option<SyncConfig>> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM note_sync_configs WHERE note_id = ?");
        Ok(self.query_configs(&sql, Some(note_id)).await?.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<SyncConfig>> {
        let sql = format!("SELECT {CONFIG_COLUMNS} FROM note_sync_configs ORDER BY note_id ASC");
        self.query_configs(&sql, None).await
    }

    async fn list_for_account(&self, account_id: &str) -> Result<Vec<SyncConfig>> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM note_sync_configs WHERE account_id = ? ORDER BY note_id ASC"
        );
        self.query_configs(&sql, Some(account_id)).await
    }

    async fn save(&self, config: &SyncConfig) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO note_sync_configs ({CONFIG_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?)"
                ),
                params![
                    config.note_id.as_str(),
                    config.account_id.as_str(),
                    i32::from(config.enabled),
                    i32::from(config.auto_commit),
                    config.sync_folder.as_str(),
                    nullable_integer(config.initial_sync_at)
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_initialized(&self, note_id: &str, at: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE note_sync_configs SET initial_sync_at = COALESCE(initial_sync_at, ?)
                 WHERE note_id = ?",
                params![at, note_id],
            )
            .await?;
        if changed == 0 {
            return Err(Error::NotFound(format!("sync config for note {note_id}")));
        }
        Ok(())
    }

    async fn delete(&self, note_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM note_sync_configs WHERE note_id = ?", [note_id])
            .await?;
        Ok(changed > 0)
    }

    async fn delete_for_account(&self, account_id: &str) -> Result<usize> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM note_sync_configs WHERE account_id = ?",
                [account_id],
            )
            .await?;
        Ok(changed as usize)
    }
}

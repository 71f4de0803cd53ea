//! libSQL handle for the sync state database

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Pragmas applied on open. The flag marks whether a failure is fatal;
/// in-memory databases reject WAL.
const PRAGMAS: &[(&str, bool)] = &[
    ("PRAGMA journal_mode = WAL;", false),
    ("PRAGMA synchronous = NORMAL;", false),
    ("PRAGMA foreign_keys = ON;", true),
    ("PRAGMA busy_timeout = 5000;", false),
];

/// Accounts, per-note sync configuration, page baselines and settings,
/// behind one libSQL connection. Shared between tasks behind an `Arc`.
pub struct Database {
    // Keeps the handle `conn` came from alive.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the state database at `path`, creating missing
    /// parent directories and applying pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::create_dir_all(parent).await?;
            }
            _ => {}
        }
        let db = Builder::new_local(path).build().await?;
        Self::connect(db).await
    }

    /// Throwaway database for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(Builder::new_local(":memory:").build().await?).await
    }

    async fn connect(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        for (pragma, required) in PRAGMAS {
            let applied = conn.execute(pragma, ()).await;
            if *required {
                applied?;
            }
        }
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let val: i32 = row.get(0).unwrap();
        assert_eq!(val, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_creates_parent_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state").join("inkwell.db");

        let db = Database::open(&path).await.unwrap();
        db.connection()
            .execute(
                "INSERT INTO settings (key, value) VALUES ('marker', '1')",
                (),
            )
            .await
            .unwrap();
        drop(db);

        assert!(path.exists());
        let reopened = Database::open(&path).await.unwrap();
        let mut rows = reopened
            .connection()
            .query("SELECT value FROM settings WHERE key = 'marker'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "1");
    }
}

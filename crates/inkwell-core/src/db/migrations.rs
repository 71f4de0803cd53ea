//! Schema migrations for the sync state database

use crate::error::Result;
use libsql::Connection;

/// A schema step: the version it produces and the statements that get there.
struct Migration {
    version: i32,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        statements: &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                display_name TEXT NOT NULL,
                connected INTEGER NOT NULL DEFAULT 1,
                is_default INTEGER NOT NULL DEFAULT 0,
                user_id TEXT,
                user_name TEXT,
                user_email TEXT,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_accounts_provider ON accounts(provider)",
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    },
    Migration {
        version: 2,
        statements: &[
            "CREATE TABLE IF NOT EXISTS note_sync_configs (
                note_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                auto_commit INTEGER NOT NULL DEFAULT 0,
                sync_folder TEXT NOT NULL,
                initial_sync_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_note_sync_configs_account ON note_sync_configs(account_id)",
            // Baselines outlive their account row until forget_account runs
            "CREATE TABLE IF NOT EXISTS sync_baselines (
                account_id TEXT NOT NULL,
                note_id TEXT NOT NULL,
                page_id TEXT NOT NULL,
                cloud_file_id TEXT NOT NULL,
                cloud_path TEXT,
                cloud_mtime INTEGER NOT NULL,
                local_mtime_at_sync INTEGER NOT NULL,
                content_hash TEXT,
                synced_at INTEGER NOT NULL,
                PRIMARY KEY (account_id, note_id, page_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_baselines_note ON sync_baselines(account_id, note_id)",
        ],
    },
];

/// Bring the schema up to the newest version, skipping steps already applied.
pub async fn run(conn: &Connection) -> Result<()> {
    let current = schema_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration).await?;
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut tables = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    let has_table = match tables.next().await? {
        Some(row) => row.get::<i64>(0)? > 0,
        None => false,
    };
    if !has_table {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let outcome = async {
        for statement in migration.statements {
            conn.execute(statement, ()).await?;
        }
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .await?;
        conn.execute("COMMIT", ()).await?;
        Ok::<(), libsql::Error>(())
    }
    .await;

    if let Err(error) = outcome {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error.into());
    }

    tracing::info!("Schema upgraded to version {}", migration.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    fn latest_version() -> i32 {
        MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
    }

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = schema_version(&conn).await.unwrap();
        assert_eq!(version, latest_version());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = schema_version(&conn).await.unwrap();
        assert_eq!(version, latest_version());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_create_sync_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in ["accounts", "settings", "note_sync_configs", "sync_baselines"] {
            assert!(table_exists(&conn, table).await, "missing {table}");
        }
    }
}

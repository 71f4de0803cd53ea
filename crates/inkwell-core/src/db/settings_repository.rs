//! Persisted sync preferences, one row per key

use crate::config::SyncSettings;
use crate::error::Result;
use libsql::Connection;

const WIFI_ONLY: &str = "sync.wifi_only";
const SAVE_CONFLICT_COPY: &str = "sync.save_conflict_copy";
const AUTO_COMMIT_DEBOUNCE_MS: &str = "sync.auto_commit_debounce_ms";
const MAX_CONCURRENT_CALLS: &str = "sync.max_concurrent_calls";

/// Storage for the user-facing sync preferences
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Overlay stored sync preferences on `base`
    async fn load(&self, base: SyncSettings) -> Result<SyncSettings>;

    /// Persist the user-facing sync preferences
    async fn save(&self, settings: &SyncSettings) -> Result<()>;
}

pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self, base: SyncSettings) -> Result<SyncSettings> {
        let mut settings = base;

        if let Some(flag) = self.get_setting(WIFI_ONLY).await? {
            settings.wifi_only = parse_flag(&flag);
        }
        if let Some(flag) = self.get_setting(SAVE_CONFLICT_COPY).await? {
            settings.save_conflict_copy = parse_flag(&flag);
        }
        // Unparseable numbers keep the base value
        if let Some(ms) = self.parsed(AUTO_COMMIT_DEBOUNCE_MS).await? {
            settings.auto_commit_debounce_ms = ms;
        }
        if let Some(calls) = self.parsed(MAX_CONCURRENT_CALLS).await? {
            settings.max_concurrent_calls = calls;
        }

        Ok(settings.validated())
    }

    async fn save(&self, settings: &SyncSettings) -> Result<()> {
        let entries = [
            (WIFI_ONLY, settings.wifi_only.to_string()),
            (SAVE_CONFLICT_COPY, settings.save_conflict_copy.to_string()),
            (
                AUTO_COMMIT_DEBOUNCE_MS,
                settings.auto_commit_debounce_ms.to_string(),
            ),
            (MAX_CONCURRENT_CALLS, settings.max_concurrent_calls.to_string()),
        ];
        for (key, value) in &entries {
            self.set_setting(key, value).await?;
        }
        Ok(())
    }
}

impl LibSqlSettingsRepository<'_> {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?1", [key])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|raw| raw.trim().parse().ok()))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

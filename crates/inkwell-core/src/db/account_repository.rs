//! Account repository implementation

use crate::error::{Error, Result};
use crate::models::{ProviderKind, RemoteAccount, UserInfo};
use libsql::{params, Connection, Row};

use super::{nullable_text, optional_text};

const ACCOUNT_COLUMNS: &str =
    "id, provider, display_name, connected, is_default, user_id, user_name, user_email, created_at";

/// Trait for account storage operations (async)
#[allow(async_fn_in_trait)]
pub trait AccountRepository {
    /// Insert a new account record
    async fn insert(&self, account: &RemoteAccount) -> Result<()>;

    /// Get an account by ID
    async fn get(&self, id: &str) -> Result<Option<RemoteAccount>>;

    /// List all accounts, oldest first
    async fn list(&self) -> Result<Vec<RemoteAccount>>;

    /// Get the account marked default, if any
    async fn default_account(&self) -> Result<Option<RemoteAccount>>;

    /// Mark one account default and clear the flag everywhere else
    async fn set_default(&self, id: &str) -> Result<()>;

    /// Flip the connected flag
    async fn set_connected(&self, id: &str, connected: bool) -> Result<()>;

    /// Replace the cached profile and display name
    async fn update_profile(&self, id: &str, display_name: &str, user: &UserInfo) -> Result<()>;

    /// Delete an account; returns whether a row was removed
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// libSQL implementation of `AccountRepository`
pub struct LibSqlAccountRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlAccountRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_account(row: &Row) -> Result<RemoteAccount> {
        let provider: String = row.get(1)?;
        let user_id = optional_text(row, 5)?;
        let user_name = optional_text(row, 6)?;
        let user_email = optional_text(row, 7)?;
        let user_info = user_id.map(|id| UserInfo {
            id,
            display_name: user_name.unwrap_or_default(),
            email: user_email,
        });

        Ok(RemoteAccount {
            id: row.get(0)?,
            provider: provider.parse::<ProviderKind>()?,
            display_name: row.get(2)?,
            connected: row.get::<i32>(3)? != 0,
            is_default: row.get::<i32>(4)? != 0,
            user_info,
            created_at: row.get(8)?,
        })
    }

    async fn query_accounts(&self, sql: &str, id: Option<&str>) -> Result<Vec<RemoteAccount>> {
        let mut rows = match id {
            Some(id) => self.conn.query(sql, [id]).await?,
            None => self.conn.query(sql, ()).await?,
        };

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(Self::parse_account(&row)?);
        }
        Ok(accounts)
    }
}

impl AccountRepository for LibSqlAccountRepository<'_> {
    async fn insert(&self, account: &RemoteAccount) -> Result<()> {
        let user = account.user_info.as_ref();
        self.conn
            .execute(
                &format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                params![
                    account.id.as_str(),
                    account.provider.as_str(),
                    account.display_name.as_str(),
                    i32::from(account.connected),
                    i32::from(account.is_default),
                    nullable_text(user.map(|info| info.id.as_str())),
                    nullable_text(user.map(|info| info.display_name.as_str())),
                    nullable_text(user.and_then(|info| info.email.as_deref())),
                    account.created_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RemoteAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        Ok(self.query_accounts(&sql, Some(id)).await?.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<RemoteAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at ASC, id ASC");
        self.query_accounts(&sql, None).await
    }

    async fn default_account(&self) -> Result<Option<RemoteAccount>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_default = 1 ORDER BY created_at ASC LIMIT 1"
        );
        Ok(self.query_accounts(&sql, None).await?.into_iter().next())
    }

    async fn set_default(&self, id: &str) -> Result<()> {
        if self.get(id).await?.is_none() {
            return Err(Error::NotFound(format!("account {id}")));
        }
        // One statement, so readers never observe two defaults
        self.conn
            .execute(
                "UPDATE accounts SET is_default = CASE WHEN id = ? THEN 1 ELSE 0 END",
                [id],
            )
            .await?;
        Ok(())
    }

    async fn set_connected(&self, id: &str, connected: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE accounts SET connected = ? WHERE id = ?",
                params![i32::from(connected), id],
            )
            .await?;
        if changed == 0 {
            return Err(Error::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn update_profile(&self, id: &str, display_name: &str, user: &UserInfo) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE accounts SET display_name = ?, user_id = ?, user_name = ?, user_email = ?
                 WHERE id = ?",
                params![
                    display_name,
                    user.id.as_str(),
                    user.display_name.as_str(),
                    nullable_text(user.email.as_deref()),
                    id
                ],
            )
            .await?;
        if changed == 0 {
            return Err(Error::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM accounts WHERE id = ?", [id])
            .await?;
        Ok(changed > 0)
    }
}

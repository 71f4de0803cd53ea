//! Account store: connected cloud accounts, their tokens, and the default
//! account preference.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::SharedDatabase;
use crate::auth::CredentialStore;
use crate::config::{ProviderAppConfigs, SyncSettings};
use crate::db::{
    AccountRepository, BaselineRepository, LibSqlAccountRepository, LibSqlBaselineRepository,
    LibSqlSyncConfigRepository, SyncConfigRepository,
};
use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use crate::models::{new_account_id, CloudFolderItem, ProviderKind, Quota, RemoteAccount};
use crate::providers::{build_provider, CloudProvider};
use crate::Error;

/// Builds the adapter for an account id
pub type ProviderFactory =
    Arc<dyn Fn(ProviderKind, &str) -> Result<Arc<dyn CloudProvider>> + Send + Sync>;

pub struct AccountStore {
    db: SharedDatabase,
    credentials: Arc<dyn CredentialStore>,
    factory: ProviderFactory,
    providers: Mutex<HashMap<String, Arc<dyn CloudProvider>>>,
    events: EventBus,
}

impl AccountStore {
    /// Store whose adapters talk to the real provider APIs
    pub fn new(
        db: SharedDatabase,
        apps: ProviderAppConfigs,
        credentials: Arc<dyn CredentialStore>,
        settings: &SyncSettings,
        events: EventBus,
    ) -> Self {
        let store = Arc::clone(&credentials);
        let settings = settings.clone();
        let factory: ProviderFactory = Arc::new(move |kind: ProviderKind, account_id: &str| {
            let app = apps.require(kind)?;
            build_provider(kind, account_id, app, Arc::clone(&store), &settings)
        });
        Self::with_factory(db, credentials, factory, events)
    }

    pub fn with_factory(
        db: SharedDatabase,
        credentials: Arc<dyn CredentialStore>,
        factory: ProviderFactory,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            credentials,
            factory,
            providers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Sign in to a new account of `kind`.
    ///
    /// The first account ever connected becomes the default.
    pub async fn connect(&self, kind: ProviderKind) -> Result<RemoteAccount> {
        let account_id = new_account_id();
        let provider = (self.factory)(kind, &account_id)?;
        let user = provider.authenticate().await?;

        let mut account = RemoteAccount::new(kind, Some(user));
        account.id = account_id;

        {
            let db = self.db.lock().await;
            let repo = LibSqlAccountRepository::new(db.connection());
            account.is_default = repo.default_account().await?.is_none();
            repo.insert(&account).await?;
        }

        self.providers
            .lock()
            .insert(account.id.clone(), provider);
        tracing::info!("Connected {} account {}", kind.display_name(), account.id);
        self.events.emit(SyncEvent::AccountChanged {
            account_id: account.id.clone(),
            connected: true,
        });
        Ok(account)
    }

    /// Re-run sign-in for an account whose refresh token was rejected.
    pub async fn reconnect(&self, account_id: &str) -> Result<RemoteAccount> {
        let account = self.require(account_id).await?;
        let provider = self.adapter(&account)?;
        let user = provider.authenticate().await?;
        let display_name = RemoteAccount::new(account.provider, Some(user.clone())).display_name;

        {
            let db = self.db.lock().await;
            let repo = LibSqlAccountRepository::new(db.connection());
            repo.update_profile(account_id, &display_name, &user).await?;
            repo.set_connected(account_id, true).await?;
        }

        tracing::info!("Reconnected account {}", account_id);
        self.events.emit(SyncEvent::AccountChanged {
            account_id: account_id.to_string(),
            connected: true,
        });
        self.require(account_id).await
    }

    pub async fn list(&self) -> Result<Vec<RemoteAccount>> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection()).list().await
    }

    pub async fn get(&self, account_id: &str) -> Result<Option<RemoteAccount>> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection())
            .get(account_id)
            .await
    }

    pub async fn require(&self, account_id: &str) -> Result<RemoteAccount> {
        self.get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {account_id}")))
    }

    pub async fn default_account(&self) -> Result<Option<RemoteAccount>> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection())
            .default_account()
            .await
    }

    pub async fn set_default(&self, account_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlAccountRepository::new(db.connection())
            .set_default(account_id)
            .await?;
        tracing::info!("Default account is now {}", account_id);
        Ok(())
    }

    /// Adapter for a connected account.
    ///
    /// A disconnected account yields `ReauthRequired` without any network call.
    pub async fn provider(&self, account_id: &str) -> Result<Arc<dyn CloudProvider>> {
        let account = self.require(account_id).await?;
        if !account.connected {
            return Err(Error::ReauthRequired {
                account_id: account_id.to_string(),
            });
        }
        self.adapter(&account)
    }

    fn adapter(&self, account: &RemoteAccount) -> Result<Arc<dyn CloudProvider>> {
        let mut providers = self.providers.lock();
        if let Some(provider) = providers.get(&account.id) {
            return Ok(Arc::clone(provider));
        }
        let provider = (self.factory)(account.provider, &account.id)?;
        providers.insert(account.id.clone(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Downgrade an account after its refresh token was rejected.
    pub async fn mark_disconnected(&self, account_id: &str) -> Result<()> {
        {
            let db = self.db.lock().await;
            LibSqlAccountRepository::new(db.connection())
                .set_connected(account_id, false)
                .await?;
        }
        tracing::warn!("Account {} needs to be reconnected", account_id);
        self.events.emit(SyncEvent::AccountChanged {
            account_id: account_id.to_string(),
            connected: false,
        });
        Ok(())
    }

    /// Remove an account: erase its tokens, baselines and note bindings.
    ///
    /// When it was the default, the oldest remaining account takes over.
    pub async fn disconnect(&self, account_id: &str) -> Result<()> {
        let account = self.require(account_id).await?;
        self.credentials.clear_tokens(account_id)?;
        self.providers.lock().remove(account_id);

        {
            let db = self.db.lock().await;
            let baselines = LibSqlBaselineRepository::new(db.connection())
                .delete_for_account(account_id)
                .await?;
            LibSqlSyncConfigRepository::new(db.connection())
                .delete_for_account(account_id)
                .await?;
            let repo = LibSqlAccountRepository::new(db.connection());
            repo.delete(account_id).await?;
            if account.is_default {
                if let Some(next) = repo.list().await?.into_iter().next() {
                    repo.set_default(&next.id).await?;
                }
            }
            tracing::info!(
                "Disconnected account {} ({} baselines removed)",
                account_id,
                baselines
            );
        }

        self.events.emit(SyncEvent::AccountChanged {
            account_id: account_id.to_string(),
            connected: false,
        });
        Ok(())
    }

    /// Fetch the profile again and store it.
    pub async fn refresh_user_info(&self, account_id: &str) -> Result<RemoteAccount> {
        let provider = self.provider(account_id).await?;
        let user = self.checked(account_id, provider.user_info().await).await?;
        let account = self.require(account_id).await?;
        let display_name = RemoteAccount::new(account.provider, Some(user.clone())).display_name;
        {
            let db = self.db.lock().await;
            LibSqlAccountRepository::new(db.connection())
                .update_profile(account_id, &display_name, &user)
                .await?;
        }
        self.require(account_id).await
    }

    pub async fn quota(&self, account_id: &str) -> Result<Quota> {
        let provider = self.provider(account_id).await?;
        self.checked(account_id, provider.quota().await).await
    }

    /// Folders and files directly under `path` (the drive root when `None`).
    pub async fn list_folder(
        &self,
        account_id: &str,
        path: Option<&str>,
    ) -> Result<Vec<CloudFolderItem>> {
        let provider = self.provider(account_id).await?;
        self.checked(account_id, provider.list_folder(path).await)
            .await
    }

    pub async fn create_folder(
        &self,
        account_id: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<CloudFolderItem> {
        let provider = self.provider(account_id).await?;
        let folder = self
            .checked(account_id, provider.create_folder(name, parent).await)
            .await?;
        tracing::info!("Created folder {} in account {}", folder.path, account_id);
        Ok(folder)
    }

    /// Downgrade a still-connected account when an adapter call reports
    /// that its refresh token was rejected.
    async fn checked<T>(&self, account_id: &str, result: Result<T>) -> Result<T> {
        if let Err(Error::ReauthRequired { .. }) = &result {
            let connected = self
                .get(account_id)
                .await?
                .is_some_and(|account| account.connected);
            if connected {
                self.mark_disconnected(account_id).await?;
            }
        }
        result
    }
}

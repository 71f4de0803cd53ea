//! Wiring of the core services for one CLI invocation.

use std::sync::Arc;

use inkwell_core::auth::CredentialStore;
use inkwell_core::db::Database;
use inkwell_core::events::EventBus;
use inkwell_core::local::{ConflictArchive, FsNoteStore};
use inkwell_core::models::{RemoteAccount, SyncConfig};
use inkwell_core::network::{ConnectivityProbe, NetworkMonitor, NetworkStatus, SystemProbe};
use inkwell_core::services::{share_database, AccountStore, SyncStateStore};
use inkwell_core::sync::{SyncContext, SyncOrchestrator};

use crate::config::AppConfig;
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

pub struct App {
    pub config: AppConfig,
    pub accounts: Arc<AccountStore>,
    pub state: SyncStateStore,
    pub network: Arc<NetworkMonitor>,
    pub archive: ConflictArchive,
    pub orchestrator: SyncOrchestrator,
}

impl App {
    /// Open the database, probe connectivity once and start the orchestrator.
    pub async fn open(config: AppConfig) -> Result<Self, CliError> {
        let status = SystemProbe::default().probe().await;
        tracing::debug!(
            "Initial network status: online={} type={}",
            status.online,
            status.connection_type.as_str()
        );
        Self::open_with(config, Arc::new(KeyringCredentialStore::new()), status).await
    }

    pub async fn open_with(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        status: NetworkStatus,
    ) -> Result<Self, CliError> {
        let db = share_database(Database::open(config.database_path()).await?);
        let state = SyncStateStore::new(Arc::clone(&db));
        let settings = state.load_settings(config.sync.clone()).await?;
        let apps = config.providers.clone().with_env_overrides()?;

        let events = EventBus::new();
        let accounts = Arc::new(AccountStore::new(
            db,
            apps,
            credentials,
            &settings,
            events.clone(),
        ));
        let network = Arc::new(NetworkMonitor::new(
            status,
            settings.wifi_only,
            events.clone(),
        ));
        let archive = ConflictArchive::new(config.conflict_dir());
        let orchestrator = SyncOrchestrator::new(SyncContext {
            accounts: Arc::clone(&accounts),
            state: state.clone(),
            local: Arc::new(FsNoteStore::new(config.notes_root())),
            archive: archive.clone(),
            network: Arc::clone(&network),
            events,
            settings,
        });

        Ok(Self {
            config,
            accounts,
            state,
            network,
            archive,
            orchestrator,
        })
    }

    /// Explicit account, or the default one.
    pub async fn resolve_account(&self, explicit: Option<&str>) -> Result<RemoteAccount, CliError> {
        if let Some(account_id) = explicit {
            return Ok(self.accounts.require(account_id.trim()).await?);
        }
        self.accounts
            .default_account()
            .await?
            .ok_or(CliError::NoAccount)
    }

    pub async fn bound_note(&self, note_id: &str) -> Result<SyncConfig, CliError> {
        self.state
            .note_config(note_id)
            .await?
            .ok_or_else(|| CliError::NoteNotBound(note_id.to_string()))
    }
}

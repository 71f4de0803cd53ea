//! Provider adapters: one uniform contract over each cloud drive.
//!
//! Adapters normalize every file they return to [`RemoteFile`]
//! (`file_id`, optional `path`, `mtime` in Unix ms), so reconciliation never
//! branches on which drive it talks to.

mod baidu;
mod http;
mod onedrive;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use baidu::BaiduPanProvider;
pub use http::{parse_api_error, ApiClient, RetryPolicy};
pub use onedrive::OneDriveProvider;

use crate::auth::{CredentialStore, OAuthClient, TokenManager};
use crate::config::{OAuthAppConfig, SyncSettings};
use crate::models::{
    CloudFolderItem, CloudNoteItem, FileRef, ProviderKind, Quota, RemoteFile, UserInfo,
};
use crate::{Error, Result};

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn account_id(&self) -> &str;

    /// Interactive sign-in; stores the token pair and returns the profile.
    async fn authenticate(&self) -> Result<UserInfo>;

    /// Refresh the access token when it is within the expiry margin.
    async fn refresh_if_expired(&self) -> Result<()>;

    async fn user_info(&self) -> Result<UserInfo>;

    /// Browse a folder; `None` is the drive root.
    async fn list_folder(&self, path: Option<&str>) -> Result<Vec<CloudFolderItem>>;

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<CloudFolderItem>;

    async fn quota(&self) -> Result<Quota>;

    /// Metadata of the file at `path`, or `None` when it does not exist.
    async fn stat(&self, path: &str) -> Result<Option<RemoteFile>>;

    /// Create or overwrite the file at `path`; missing parents are created.
    async fn upload_page(&self, path: &str, bytes: &[u8]) -> Result<RemoteFile>;

    async fn download_page(&self, file_id: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, file: &FileRef) -> Result<()>;

    /// Note folders under the sync folder.
    async fn list_notes(&self, sync_folder: &str) -> Result<Vec<CloudNoteItem>> {
        let items = match self.list_folder(Some(sync_folder)).await {
            Ok(items) => items,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        Ok(items
            .into_iter()
            .filter(|item| item.is_folder)
            .map(|item| CloudNoteItem {
                note_id: item.name,
                folder_id: item.id,
                path: item.path,
                mtime: item.mtime,
            })
            .collect())
    }

    /// Page files of one note folder, keyed by page id.
    async fn list_pages(&self, note_folder: &str) -> Result<BTreeMap<String, RemoteFile>> {
        let items = match self.list_folder(Some(note_folder)).await {
            Ok(items) => items,
            Err(Error::NotFound(_)) => return Ok(BTreeMap::new()),
            Err(error) => return Err(error),
        };
        Ok(items
            .iter()
            .filter_map(|item| {
                item.page_id()
                    .map(|page_id| (page_id.to_string(), item.to_remote_file()))
            })
            .collect())
    }
}

/// Build the adapter for `kind`, sharing `store` for token persistence.
pub fn build_provider(
    kind: ProviderKind,
    account_id: &str,
    app: &OAuthAppConfig,
    store: Arc<dyn CredentialStore>,
    settings: &SyncSettings,
) -> Result<Arc<dyn CloudProvider>> {
    app.validate(kind)?;
    let oauth = OAuthClient::new(kind, app.clone())?;
    let tokens = Arc::new(TokenManager::new(account_id, oauth, store));
    let api = ApiClient::new(tokens, settings)?;
    let provider: Arc<dyn CloudProvider> = match kind {
        ProviderKind::OneDrive => Arc::new(OneDriveProvider::new(api, app.api_base_url.clone())),
        ProviderKind::BaiduPan => Arc::new(BaiduPanProvider::new(api, app.api_base_url.clone())),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;

    #[test]
    fn factory_builds_adapter_for_each_kind() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let onedrive = build_provider(
            ProviderKind::OneDrive,
            "a1",
            &OAuthAppConfig::new("client"),
            Arc::clone(&store),
            &SyncSettings::default(),
        )
        .unwrap();
        assert_eq!(onedrive.kind(), ProviderKind::OneDrive);
        assert_eq!(onedrive.account_id(), "a1");

        let mut baidu_app = OAuthAppConfig::new("app-key");
        baidu_app.client_secret = Some("secret".to_string());
        let baidu = build_provider(
            ProviderKind::BaiduPan,
            "a2",
            &baidu_app,
            store,
            &SyncSettings::default(),
        )
        .unwrap();
        assert_eq!(baidu.kind(), ProviderKind::BaiduPan);
    }

    #[test]
    fn factory_rejects_baidu_without_secret() {
        let result = build_provider(
            ProviderKind::BaiduPan,
            "a2",
            &OAuthAppConfig::new("app-key"),
            Arc::new(MemoryCredentialStore::new()),
            &SyncSettings::default(),
        );
        assert!(result.is_err());
    }
}

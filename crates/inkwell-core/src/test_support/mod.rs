//! Test doubles shared by unit tests.

pub mod http;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::models::{CloudFolderItem, FileRef, ProviderKind, Quota, RemoteFile, UserInfo};
use crate::providers::CloudProvider;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredFile {
    file_id: String,
    content: Vec<u8>,
    mtime: i64,
}

#[derive(Default)]
struct DriveState {
    files: BTreeMap<String, StoredFile>,
    next_id: u64,
    clock: i64,
    failing_uploads: HashMap<String, u16>,
    transient_upload_failures: HashMap<String, usize>,
    reauth_required: bool,
}

impl DriveState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }
}

/// Scripted in-memory drive that counts every call.
pub struct FakeProvider {
    kind: ProviderKind,
    account_id: String,
    user: UserInfo,
    state: Mutex<DriveState>,
    upload_delay: Mutex<Option<Duration>>,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    deletes: AtomicUsize,
    listings: AtomicUsize,
    stats: AtomicUsize,
    authentications: AtomicUsize,
}

impl FakeProvider {
    pub fn new(account_id: &str) -> Self {
        Self::with_kind(ProviderKind::OneDrive, account_id)
    }

    pub fn with_kind(kind: ProviderKind, account_id: &str) -> Self {
        Self {
            kind,
            account_id: account_id.to_string(),
            user: UserInfo {
                id: format!("user-{account_id}"),
                display_name: "Ada".to_string(),
                email: Some("ada@example.com".to_string()),
            },
            state: Mutex::new(DriveState {
                clock: 1_000,
                ..DriveState::default()
            }),
            upload_delay: Mutex::new(None),
            uploads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
            stats: AtomicUsize::new(0),
            authentications: AtomicUsize::new(0),
        }
    }

    /// Place a file as if another device had uploaded it.
    pub fn seed(&self, path: &str, content: &[u8], mtime: i64) -> RemoteFile {
        let mut state = self.state.lock();
        state.clock = state.clock.max(mtime);
        state.next_id += 1;
        let file_id = format!("fid-{}", state.next_id);
        state.files.insert(
            path.to_string(),
            StoredFile {
                file_id: file_id.clone(),
                content: content.to_vec(),
                mtime,
            },
        );
        RemoteFile {
            file_id,
            path: Some(path.to_string()),
            mtime,
            size: Some(content.len() as u64),
        }
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|file| file.content.clone())
    }

    pub fn mtime(&self, path: &str) -> Option<i64> {
        self.state.lock().files.get(path).map(|file| file.mtime)
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Uploads to `path` fail with a non-retryable provider error.
    pub fn fail_uploads_to(&self, path: &str, code: u16) {
        self.state
            .lock()
            .failing_uploads
            .insert(path.to_string(), code);
    }

    /// The next `count` uploads to `path` fail with a 503.
    pub fn fail_uploads_transiently(&self, path: &str, count: usize) {
        self.state
            .lock()
            .transient_upload_failures
            .insert(path.to_string(), count);
    }

    pub fn require_reauth(&self) {
        self.state.lock().reauth_required = true;
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock() = Some(delay);
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    /// Every call that would reach the network
    pub fn network_calls(&self) -> usize {
        self.uploads()
            + self.downloads()
            + self.deletes()
            + self.listings.load(Ordering::SeqCst)
            + self.stats.load(Ordering::SeqCst)
    }

    fn check_auth(&self) -> Result<()> {
        if self.state.lock().reauth_required {
            return Err(Error::ReauthRequired {
                account_id: self.account_id.clone(),
            });
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn authenticate(&self) -> Result<UserInfo> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        self.state.lock().reauth_required = false;
        Ok(self.user.clone())
    }

    async fn refresh_if_expired(&self) -> Result<()> {
        self.check_auth()
    }

    async fn user_info(&self) -> Result<UserInfo> {
        self.check_auth()?;
        Ok(self.user.clone())
    }

    async fn list_folder(&self, path: Option<&str>) -> Result<Vec<CloudFolderItem>> {
        self.check_auth()?;
        self.listings.fetch_add(1, Ordering::SeqCst);
        let folder = crate::util::normalize_remote_folder(path.unwrap_or("/"));
        let state = self.state.lock();

        let mut items = Vec::new();
        let mut folders = BTreeSet::new();
        for (file_path, file) in &state.files {
            if parent_of(file_path) == folder {
                items.push(CloudFolderItem {
                    id: file.file_id.clone(),
                    name: name_of(file_path).to_string(),
                    path: file_path.clone(),
                    is_folder: false,
                    mtime: file.mtime,
                    size: Some(file.content.len() as u64),
                });
                continue;
            }
            let prefix = if folder == "/" {
                "/".to_string()
            } else {
                format!("{folder}/")
            };
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                if let Some((child, _)) = rest.split_once('/') {
                    folders.insert(child.to_string());
                }
            }
        }
        if items.is_empty() && folders.is_empty() {
            return Err(Error::NotFound(folder));
        }
        for child in folders {
            let child_path = crate::util::join_remote_path(&folder, &child);
            items.push(CloudFolderItem {
                id: format!("folder:{child_path}"),
                name: child,
                path: child_path,
                is_folder: true,
                mtime: 0,
                size: None,
            });
        }
        Ok(items)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<CloudFolderItem> {
        self.check_auth()?;
        let path = crate::util::join_remote_path(parent.unwrap_or("/"), name);
        Ok(CloudFolderItem {
            id: format!("folder:{path}"),
            name: name.to_string(),
            path,
            is_folder: true,
            mtime: 0,
            size: None,
        })
    }

    async fn quota(&self) -> Result<Quota> {
        self.check_auth()?;
        let used = self
            .state
            .lock()
            .files
            .values()
            .map(|file| file.content.len() as u64)
            .sum();
        Ok(Quota {
            used,
            total: 1 << 30,
        })
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteFile>> {
        self.check_auth()?;
        self.stats.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().files.get(path).map(|file| RemoteFile {
            file_id: file.file_id.clone(),
            path: Some(path.to_string()),
            mtime: file.mtime,
            size: Some(file.content.len() as u64),
        }))
    }

    async fn upload_page(&self, path: &str, bytes: &[u8]) -> Result<RemoteFile> {
        self.check_auth()?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.upload_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(code) = state.failing_uploads.get(path) {
            return Err(Error::Provider {
                code: *code,
                message: format!("upload to {path} rejected"),
            });
        }
        if let Some(remaining) = state.transient_upload_failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Provider {
                    code: 503,
                    message: "service busy".to_string(),
                });
            }
        }

        let mtime = state.tick();
        let file_id = match state.files.get(path) {
            Some(existing) => existing.file_id.clone(),
            None => {
                state.next_id += 1;
                format!("fid-{}", state.next_id)
            }
        };
        state.files.insert(
            path.to_string(),
            StoredFile {
                file_id: file_id.clone(),
                content: bytes.to_vec(),
                mtime,
            },
        );
        Ok(RemoteFile {
            file_id,
            path: Some(path.to_string()),
            mtime,
            size: Some(bytes.len() as u64),
        })
    }

    async fn download_page(&self, file_id: &str) -> Result<Vec<u8>> {
        self.check_auth()?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .files
            .values()
            .find(|file| file.file_id == file_id)
            .map(|file| file.content.clone())
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))
    }

    async fn delete_file(&self, file: &FileRef) -> Result<()> {
        self.check_auth()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        match file {
            FileRef::Path(path) => {
                state.files.remove(path);
            }
            FileRef::Id(id) => state.files.retain(|_, stored| &stored.file_id != id),
        }
        Ok(())
    }
}

//! Microsoft Graph adapter (path addressed, item ids as stable identity).

use async_trait::async_trait;
use serde::Deserialize;

use super::http::ApiClient;
use super::CloudProvider;
use crate::models::{CloudFolderItem, FileRef, ProviderKind, Quota, RemoteFile, UserInfo};
use crate::util::{join_remote_path, normalize_remote_folder};
use crate::{Error, Result};

const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const PAGE_SIZE: u32 = 200;

pub struct OneDriveProvider {
    api: ApiClient,
    base_url: String,
}

impl OneDriveProvider {
    pub fn new(api: ApiClient, base_url: Option<String>) -> Self {
        Self {
            api,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    /// `/me/drive/root` or `/me/drive/root:/a/b:` for a path.
    fn item_url(&self, path: &str) -> String {
        let path = normalize_remote_folder(path);
        if path == "/" {
            format!("{}/me/drive/root", self.base_url)
        } else {
            format!("{}/me/drive/root:{}:", self.base_url, encode_path(&path))
        }
    }

    fn children_url(&self, path: &str) -> String {
        format!("{}/children", self.item_url(path))
    }

    async fn fetch_item(&self, path: &str) -> Result<Option<DriveItem>> {
        let url = self.item_url(path);
        match self
            .api
            .json::<DriveItem, _>("onedrive stat", |client, token| {
                client.get(&url).bearer_auth(token)
            })
            .await
        {
            Ok(item) => Ok(Some(item)),
            Err(error) if error.status_code() == Some(404) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl CloudProvider for OneDriveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OneDrive
    }

    fn account_id(&self) -> &str {
        self.api.tokens().account_id()
    }

    async fn authenticate(&self) -> Result<UserInfo> {
        self.api.tokens().sign_in().await?;
        self.user_info().await
    }

    async fn refresh_if_expired(&self) -> Result<()> {
        self.api.tokens().refresh_if_expired().await
    }

    async fn user_info(&self) -> Result<UserInfo> {
        let url = format!("{}/me", self.base_url);
        let profile = self
            .api
            .json::<GraphUser, _>("onedrive profile", |client, token| {
                client.get(&url).bearer_auth(token)
            })
            .await?;
        Ok(UserInfo {
            display_name: profile
                .display_name
                .clone()
                .or_else(|| profile.user_principal_name.clone())
                .unwrap_or_else(|| profile.id.clone()),
            email: profile.mail.or(profile.user_principal_name),
            id: profile.id,
        })
    }

    async fn list_folder(&self, path: Option<&str>) -> Result<Vec<CloudFolderItem>> {
        let folder = normalize_remote_folder(path.unwrap_or("/"));
        let mut next = Some(format!("{}?$top={PAGE_SIZE}", self.children_url(&folder)));
        let mut items = Vec::new();

        while let Some(url) = next.take() {
            let page = match self
                .api
                .json::<DriveItemPage, _>("onedrive list folder", |client, token| {
                    client.get(&url).bearer_auth(token)
                })
                .await
            {
                Ok(page) => page,
                Err(error) if error.status_code() == Some(404) => {
                    return Err(Error::NotFound(format!("OneDrive folder {folder}")));
                }
                Err(error) => return Err(error),
            };
            items.extend(page.value.into_iter().map(|item| item.into_folder_item(&folder)));
            next = page.next_link;
        }

        Ok(items)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<CloudFolderItem> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidInput(format!("Invalid folder name: {name:?}")));
        }
        let parent = normalize_remote_folder(parent.unwrap_or("/"));
        let url = self.children_url(&parent);
        let body = serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        });
        let item = self
            .api
            .json::<DriveItem, _>("onedrive create folder", |client, token| {
                client.post(&url).bearer_auth(token).json(&body)
            })
            .await?;
        Ok(item.into_folder_item(&parent))
    }

    async fn quota(&self) -> Result<Quota> {
        let url = format!("{}/me/drive", self.base_url);
        let drive = self
            .api
            .json::<GraphDrive, _>("onedrive quota", |client, token| {
                client.get(&url).bearer_auth(token)
            })
            .await?;
        let quota = drive.quota.unwrap_or_default();
        Ok(Quota {
            used: quota.used.unwrap_or(0),
            total: quota.total.unwrap_or(0),
        })
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteFile>> {
        let path = normalize_remote_folder(path);
        Ok(self
            .fetch_item(&path)
            .await?
            .filter(|item| item.folder.is_none())
            .map(|item| item.into_remote_file(&path)))
    }

    async fn upload_page(&self, path: &str, bytes: &[u8]) -> Result<RemoteFile> {
        let path = normalize_remote_folder(path);
        let url = format!("{}/content", self.item_url(&path));
        let body = bytes.to_vec();
        let item = self
            .api
            .json::<DriveItem, _>("onedrive upload", |client, token| {
                client
                    .put(&url)
                    .bearer_auth(token)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(body.clone())
            })
            .await?;
        Ok(item.into_remote_file(&path))
    }

    async fn download_page(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/me/drive/items/{}/content",
            self.base_url,
            urlencoding::encode(file_id)
        );
        self.api
            .bytes("onedrive download", |client, token| {
                client.get(&url).bearer_auth(token)
            })
            .await
    }

    async fn delete_file(&self, file: &FileRef) -> Result<()> {
        let url = match file {
            FileRef::Id(id) => format!(
                "{}/me/drive/items/{}",
                self.base_url,
                urlencoding::encode(id)
            ),
            FileRef::Path(path) => self.item_url(path),
        };
        match self
            .api
            .empty("onedrive delete", |client, token| {
                client.delete(&url).bearer_auth(token)
            })
            .await
        {
            Err(error) if error.status_code() == Some(404) => {
                tracing::debug!("OneDrive item {} already deleted", file.as_str());
                Ok(())
            }
            other => other,
        }
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_graph_time(value: Option<&str>) -> i64 {
    value
        .and_then(|value| chrono::DateTime::parse_from_rfc3339(value).ok())
        .map_or(0, |time| time.timestamp_millis())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDrive {
    quota: Option<GraphQuota>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphQuota {
    used: Option<u64>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DriveItemPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    last_modified_date_time: Option<String>,
    size: Option<u64>,
    folder: Option<serde_json::Value>,
}

impl DriveItem {
    fn into_folder_item(self, parent: &str) -> CloudFolderItem {
        CloudFolderItem {
            path: join_remote_path(parent, &self.name),
            mtime: parse_graph_time(self.last_modified_date_time.as_deref()),
            is_folder: self.folder.is_some(),
            size: self.size,
            id: self.id,
            name: self.name,
        }
    }

    fn into_remote_file(self, path: &str) -> RemoteFile {
        RemoteFile {
            file_id: self.id,
            path: Some(path.to_string()),
            mtime: parse_graph_time(self.last_modified_date_time.as_deref()),
            size: self.size,
        }
    }
}

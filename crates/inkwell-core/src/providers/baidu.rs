//! Baidu Pan (xpan) adapter: numeric `fs_id` identity, path-based writes.
//!
//! Baidu answers most failures with HTTP 200 and a non-zero `errno`; those are
//! mapped onto the shared error taxonomy before the retry policy sees them.

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::http::ApiClient;
use super::CloudProvider;
use crate::models::{CloudFolderItem, FileRef, ProviderKind, Quota, RemoteFile, UserInfo};
use crate::util::{join_remote_path, normalize_remote_folder};
use crate::{Error, Result};

const DEFAULT_API_BASE: &str = "https://pan.baidu.com";
const DEFAULT_UPLOAD_BASE: &str = "https://d.pcs.baidu.com";
const BAIDU_USER_AGENT: &str = "pan.baidu.com";
const BLOCK_SIZE: usize = 4 * 1024 * 1024;
const LIST_LIMIT: usize = 1000;
/// Overwrite an existing file at the same path
const RTYPE_OVERWRITE: &str = "3";
/// Precreate found identical content; the file exists without any block upload
const RETURN_TYPE_RAPID: u8 = 2;

pub struct BaiduPanProvider {
    api: ApiClient,
    base_url: String,
    upload_url: String,
}

impl BaiduPanProvider {
    /// `base_url` overrides both the API and the upload host.
    pub fn new(api: ApiClient, base_url: Option<String>) -> Self {
        let upload_url = base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE.to_string());
        Self {
            api,
            base_url: base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            upload_url,
        }
    }

    fn file_url(&self) -> String {
        format!("{}/rest/2.0/xpan/file", self.base_url)
    }

    async fn get<T: DeserializeOwned + Send>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.api
            .call(
                operation,
                |client, token| {
                    client
                        .get(url)
                        .header(reqwest::header::USER_AGENT, BAIDU_USER_AGENT)
                        .query(query)
                        .query(&[("access_token", token)])
                },
                parse_response::<T>,
            )
            .await
    }

    async fn post_form<T: DeserializeOwned + Send>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<T> {
        self.api
            .call(
                operation,
                |client, token| {
                    client
                        .post(url)
                        .header(reqwest::header::USER_AGENT, BAIDU_USER_AGENT)
                        .query(query)
                        .query(&[("access_token", token)])
                        .form(form)
                },
                parse_response::<T>,
            )
            .await
    }

    async fn file_metas(&self, fs_id: u64, with_dlink: bool) -> Result<Option<FileMeta>> {
        let url = format!("{}/rest/2.0/xpan/multimedia", self.base_url);
        let query = [
            ("method", "filemetas".to_string()),
            ("fsids", format!("[{fs_id}]")),
            ("dlink", if with_dlink { "1" } else { "0" }.to_string()),
        ];
        let response: FileMetasResponse = self.get("baidu filemetas", &url, &query).await?;
        Ok(response.list.into_iter().find(|meta| meta.fs_id == fs_id))
    }

    async fn upload_block(
        &self,
        path: &str,
        upload_id: &str,
        part_seq: usize,
        block: &[u8],
    ) -> Result<()> {
        let url = format!("{}/rest/2.0/pcs/superfile2", self.upload_url);
        let query = [
            ("method", "upload".to_string()),
            ("type", "tmpfile".to_string()),
            ("path", path.to_string()),
            ("uploadid", upload_id.to_string()),
            ("partseq", part_seq.to_string()),
        ];
        self.api
            .call(
                "baidu upload block",
                |client, token| {
                    let part = Part::bytes(block.to_vec()).file_name("blob");
                    client
                        .post(&url)
                        .header(reqwest::header::USER_AGENT, BAIDU_USER_AGENT)
                        .query(&query)
                        .query(&[("access_token", token)])
                        .multipart(Form::new().part("file", part))
                },
                |body| parse_response::<serde_json::Value>(body).map(|_| ()),
            )
            .await
    }

    /// Remote file for a finished upload. Replies without an mtime are
    /// completed from a `stat`, so the baseline matches later listings.
    async fn uploaded(
        &self,
        path: String,
        created: CreateResponse,
        len: usize,
    ) -> Result<RemoteFile> {
        tracing::debug!("Uploaded {} as fs_id {}", path, created.fs_id);
        let path = created.path.unwrap_or(path);
        if let Some(mtime) = created.mtime {
            return Ok(RemoteFile {
                file_id: created.fs_id.to_string(),
                path: Some(path),
                mtime: seconds_to_millis(mtime),
                size: created.size.or(Some(len as u64)),
            });
        }
        self.stat(&path).await?.ok_or_else(|| Error::Provider {
            code: 502,
            message: format!("Uploaded {path} is not listed by Baidu"),
        })
    }
}

#[async_trait]
impl CloudProvider for BaiduPanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BaiduPan
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
        let url = format!("{}/rest/2.0/xpan/nas", self.base_url);
        let info: UserInfoResponse = self
            .get("baidu uinfo", &url, &[("method", "uinfo".to_string())])
            .await?;
        let display_name = info
            .netdisk_name
            .filter(|name| !name.trim().is_empty())
            .or(info.baidu_name)
            .unwrap_or_else(|| info.uk.to_string());
        Ok(UserInfo {
            id: info.uk.to_string(),
            display_name,
            email: None,
        })
    }

    async fn list_folder(&self, path: Option<&str>) -> Result<Vec<CloudFolderItem>> {
        let folder = normalize_remote_folder(path.unwrap_or("/"));
        let url = self.file_url();
        let mut items = Vec::new();
        let mut start = 0;

        loop {
            let query = [
                ("method", "list".to_string()),
                ("dir", folder.clone()),
                ("order", "name".to_string()),
                ("start", start.to_string()),
                ("limit", LIST_LIMIT.to_string()),
            ];
            let page: ListResponse = self.get("baidu list folder", &url, &query).await?;
            let count = page.list.len();
            items.extend(page.list.into_iter().map(|entry| entry.into_folder_item(&folder)));
            if count < LIST_LIMIT {
                break;
            }
            start += count;
        }

        Ok(items)
    }

    async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<CloudFolderItem> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidInput(format!("Invalid folder name: {name:?}")));
        }
        let parent = normalize_remote_folder(parent.unwrap_or("/"));
        let path = join_remote_path(&parent, name);
        let form = [
            ("path", path.clone()),
            ("isdir", "1".to_string()),
            ("rtype", "0".to_string()),
        ];
        let created: CreateResponse = self
            .post_form(
                "baidu create folder",
                &self.file_url(),
                &[("method", "create".to_string())],
                &form,
            )
            .await?;
        Ok(CloudFolderItem {
            id: created.fs_id.to_string(),
            name: name.to_string(),
            path: created.path.unwrap_or(path),
            is_folder: true,
            mtime: seconds_to_millis(created.mtime.unwrap_or_default()),
            size: None,
        })
    }

    async fn quota(&self) -> Result<Quota> {
        let url = format!("{}/api/quota", self.base_url);
        let quota: QuotaResponse = self
            .get(
                "baidu quota",
                &url,
                &[("checkfree", "1".to_string()), ("checkexpire", "1".to_string())],
            )
            .await?;
        Ok(Quota {
            used: quota.used,
            total: quota.total,
        })
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteFile>> {
        let path = normalize_remote_folder(path);
        let Some((parent, name)) = path.rsplit_once('/') else {
            return Ok(None);
        };
        let parent = if parent.is_empty() { "/" } else { parent };
        let items = match self.list_folder(Some(parent)).await {
            Ok(items) => items,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error),
        };
        Ok(items
            .into_iter()
            .find(|item| !item.is_folder && item.name == name)
            .map(|item| item.to_remote_file()))
    }

    async fn upload_page(&self, path: &str, bytes: &[u8]) -> Result<RemoteFile> {
        let path = normalize_remote_folder(path);
        let blocks = split_blocks(bytes);
        let block_list = serde_json::to_string(
            &blocks
                .iter()
                .map(|block| hex::encode(Md5::digest(block)))
                .collect::<Vec<_>>(),
        )?;
        let size = bytes.len().to_string();
        let url = self.file_url();

        let precreate_form = [
            ("path", path.clone()),
            ("size", size.clone()),
            ("isdir", "0".to_string()),
            ("autoinit", "1".to_string()),
            ("rtype", RTYPE_OVERWRITE.to_string()),
            ("block_list", block_list.clone()),
        ];
        let precreate: PrecreateResponse = self
            .post_form(
                "baidu precreate",
                &url,
                &[("method", "precreate".to_string())],
                &precreate_form,
            )
            .await?;

        if precreate.return_type == Some(RETURN_TYPE_RAPID) {
            tracing::debug!("Baidu already holds the content of {}; no blocks sent", path);
            let known = precreate.info.ok_or_else(|| Error::Provider {
                code: 502,
                message: format!("Baidu rapid upload of {path} returned no file info"),
            })?;
            return self.uploaded(path, known, bytes.len()).await;
        }
        let upload_id = precreate
            .uploadid
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Provider {
                code: 502,
                message: format!("Baidu precreate of {path} returned no upload id"),
            })?;

        let pending = if precreate.block_list.is_empty() {
            (0..blocks.len()).collect::<Vec<_>>()
        } else {
            precreate.block_list
        };
        for index in pending {
            let block = blocks.get(index).ok_or_else(|| Error::Provider {
                code: 400,
                message: format!("Baidu requested unknown block {index}"),
            })?;
            self.upload_block(&path, &upload_id, index, block).await?;
        }

        let create_form = [
            ("path", path.clone()),
            ("size", size),
            ("isdir", "0".to_string()),
            ("rtype", RTYPE_OVERWRITE.to_string()),
            ("uploadid", upload_id),
            ("block_list", block_list),
        ];
        let created: CreateResponse = self
            .post_form(
                "baidu create file",
                &url,
                &[("method", "create".to_string())],
                &create_form,
            )
            .await?;
        self.uploaded(path, created, bytes.len()).await
    }

    async fn download_page(&self, file_id: &str) -> Result<Vec<u8>> {
        let fs_id = parse_fs_id(file_id)?;
        let meta = self
            .file_metas(fs_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Baidu file {fs_id}")))?;
        let dlink = meta
            .dlink
            .ok_or_else(|| Error::Provider {
                code: 502,
                message: format!("Baidu returned no download link for {fs_id}"),
            })?;
        self.api
            .bytes("baidu download", |client, token| {
                client
                    .get(&dlink)
                    .header(reqwest::header::USER_AGENT, BAIDU_USER_AGENT)
                    .query(&[("access_token", token)])
            })
            .await
    }

    async fn delete_file(&self, file: &FileRef) -> Result<()> {
        let path = match file {
            FileRef::Path(path) => normalize_remote_folder(path),
            FileRef::Id(id) => match self.file_metas(parse_fs_id(id)?, false).await? {
                Some(FileMeta {
                    path: Some(path), ..
                }) => path,
                _ => {
                    tracing::debug!("Baidu file {} already deleted", id);
                    return Ok(());
                }
            },
        };

        let filelist = serde_json::to_string(&[path.as_str()])?;
        let result = self
            .post_form::<serde_json::Value>(
                "baidu delete",
                &self.file_url(),
                &[
                    ("method", "filemanager".to_string()),
                    ("opera", "delete".to_string()),
                ],
                &[("async", "0".to_string()), ("filelist", filelist)],
            )
            .await;
        match result {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

/// Check `errno` and deserialize the payload.
fn parse_response<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    if let Some(errno) = envelope.errno.filter(|errno| *errno != 0) {
        return Err(errno_error(errno, envelope.errmsg.as_deref()));
    }
    Ok(serde_json::from_slice(body)?)
}

fn errno_error(errno: i64, message: Option<&str>) -> Error {
    let detail = message.map_or_else(
        || format!("errno {errno}"),
        |message| format!("errno {errno}: {message}"),
    );
    match errno {
        -6 | 110 | 111 => Error::Provider {
            code: 401,
            message: detail,
        },
        -9 | 31066 => Error::NotFound(detail),
        31034 => Error::Provider {
            code: 503,
            message: detail,
        },
        _ => Error::Provider {
            code: 400,
            message: detail,
        },
    }
}

fn parse_fs_id(file_id: &str) -> Result<u64> {
    file_id
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid Baidu fs_id: {file_id}")))
}

const fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1_000)
}

fn split_blocks(bytes: &[u8]) -> Vec<&[u8]> {
    if bytes.is_empty() {
        vec![bytes]
    } else {
        bytes.chunks(BLOCK_SIZE).collect()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    errno: Option<i64>,
    errmsg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    baidu_name: Option<String>,
    netdisk_name: Option<String>,
    uk: u64,
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    total: u64,
    used: u64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    list: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    fs_id: u64,
    path: String,
    server_filename: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    server_mtime: i64,
    #[serde(default)]
    isdir: u8,
}

impl ListEntry {
    fn into_folder_item(self, parent: &str) -> CloudFolderItem {
        let is_folder = self.isdir == 1;
        let path = if self.path.is_empty() {
            join_remote_path(parent, &self.server_filename)
        } else {
            self.path
        };
        CloudFolderItem {
            id: self.fs_id.to_string(),
            name: self.server_filename,
            path,
            is_folder,
            mtime: seconds_to_millis(self.server_mtime),
            size: (!is_folder).then_some(self.size),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrecreateResponse {
    return_type: Option<u8>,
    uploadid: Option<String>,
    #[serde(default)]
    block_list: Vec<usize>,
    /// Set when `return_type` reports a rapid upload
    info: Option<CreateResponse>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    fs_id: u64,
    path: Option<String>,
    size: Option<u64>,
    mtime: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileMetasResponse {
    #[serde(default)]
    list: Vec<FileMeta>,
}

#[derive(Debug, Deserialize)]
struct FileMeta {
    fs_id: u64,
    path: Option<String>,
    dlink: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::{MemoryCredentialStore, OAuthClient, TokenManager, TokenSet};
    use crate::config::{OAuthAppConfig, SyncSettings};
    use crate::providers::RetryPolicy;
    use crate::test_support::http::{Reply, TestServer};
    use crate::util::unix_timestamp_now;

    fn provider(server: &TestServer, token_url: Option<String>) -> BaiduPanProvider {
        let mut app = OAuthAppConfig::new("app-key");
        app.client_secret = Some("secret".to_string());
        app.token_url = token_url;
        let oauth = OAuthClient::new(ProviderKind::BaiduPan, app).unwrap();
        let tokens = Arc::new(TokenManager::new(
            "acct",
            oauth,
            Arc::new(MemoryCredentialStore::new()),
        ));
        tokens
            .install(&TokenSet {
                access_token: "token-1".to_string(),
                refresh_token: "refresh-1".to_string(),
                expires_at: unix_timestamp_now() + 3_600,
                scope: None,
            })
            .unwrap();
        let api = ApiClient::new(tokens, &SyncSettings::default())
            .unwrap()
            .with_retry(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            });
        BaiduPanProvider::new(api, Some(server.base_url()))
    }

    #[test]
    fn errno_maps_onto_taxonomy() {
        assert_eq!(errno_error(111, None).status_code(), Some(401));
        assert!(matches!(errno_error(-9, None), Error::NotFound(_)));
        assert!(errno_error(31034, Some("hit frequency limit")).is_transient());
        assert_eq!(errno_error(2, None).status_code(), Some(400));
    }

    #[test]
    fn empty_content_is_one_block() {
        assert_eq!(split_blocks(b"").len(), 1);
        assert_eq!(split_blocks(&vec![0_u8; BLOCK_SIZE + 1]).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_pages_uses_fs_id_and_server_mtime() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"errno":0,"list":[
                {"fs_id":1001,"path":"/apps/inkwell/n1/p1.page","server_filename":"p1.page","size":12,"server_mtime":1700000000,"isdir":0},
                {"fs_id":1002,"path":"/apps/inkwell/n1/img","server_filename":"img","size":0,"server_mtime":1700000001,"isdir":1}
            ]}"#,
        )])
        .await;
        let provider = provider(&server, None);

        let pages = provider.list_pages("/apps/inkwell/n1").await.unwrap();
        assert_eq!(
            pages["p1"],
            RemoteFile {
                file_id: "1001".to_string(),
                path: Some("/apps/inkwell/n1/p1.page".to_string()),
                mtime: 1_700_000_000_000,
                size: Some(12),
            }
        );
        assert_eq!(pages.len(), 1);
        let target = &server.requests()[0].target;
        assert!(target.starts_with("/rest/2.0/xpan/file?method=list"));
        assert!(target.contains("access_token=token-1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_directory_lists_no_pages() {
        let server = TestServer::start(vec![Reply::json(200, r#"{"errno":-9}"#)]).await;
        let provider = provider(&server, None);
        assert!(provider.list_pages("/apps/inkwell/n1").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_runs_precreate_block_and_create() {
        let server = TestServer::start(vec![
            Reply::json(
                200,
                r#"{"errno":0,"return_type":1,"uploadid":"up-1","block_list":[0]}"#,
            ),
            Reply::json(200, r#"{"md5":"abc"}"#),
            Reply::json(
                200,
                r#"{"errno":0,"fs_id":42,"path":"/apps/inkwell/n1/p1.page","size":5,"mtime":1700000100}"#,
            ),
        ])
        .await;
        let provider = provider(&server, None);

        let remote = provider
            .upload_page("/apps/inkwell/n1/p1.page", b"hello")
            .await
            .unwrap();
        assert_eq!(remote.file_id, "42");
        assert_eq!(remote.mtime, 1_700_000_100_000);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].target.contains("method=precreate"));
        let expected_md5 = hex::encode(Md5::digest(b"hello"));
        assert!(requests[0].body_text().contains(&expected_md5));
        assert!(requests[1].target.starts_with("/rest/2.0/pcs/superfile2?method=upload"));
        assert!(requests[1].target.contains("uploadid=up-1"));
        assert!(requests[1].body_text().contains("hello"));
        assert!(requests[2].target.contains("method=create"));
        assert!(requests[2].body_text().contains("rtype=3"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rapid_upload_skips_blocks_and_create() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"errno":0,"return_type":2,"info":{"fs_id":77,"path":"/apps/inkwell/n1/p1.page","size":5,"mtime":1700000200}}"#,
        )])
        .await;
        let provider = provider(&server, None);

        let remote = provider
            .upload_page("/apps/inkwell/n1/p1.page", b"hello")
            .await
            .unwrap();
        assert_eq!(remote.file_id, "77");
        assert_eq!(remote.mtime, 1_700_000_200_000);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn precreate_without_upload_id_fails_before_sending_blocks() {
        let server = TestServer::start(vec![Reply::json(200, r#"{"errno":0,"return_type":1}"#)]).await;
        let provider = provider(&server, None);

        let error = provider
            .upload_page("/apps/inkwell/n1/p1.page", b"hello")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Provider { code: 502, .. }));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_without_mtime_reads_it_from_the_listing() {
        let server = TestServer::start(vec![
            Reply::json(200, r#"{"errno":0,"return_type":1,"uploadid":"up-2","block_list":[0]}"#),
            Reply::json(200, r#"{"md5":"abc"}"#),
            Reply::json(200, r#"{"errno":0,"fs_id":43,"path":"/apps/inkwell/n1/p1.page"}"#),
            Reply::json(
                200,
                r#"{"errno":0,"list":[{"fs_id":43,"path":"/apps/inkwell/n1/p1.page","server_filename":"p1.page","size":5,"server_mtime":1700000300,"isdir":0}]}"#,
            ),
        ])
        .await;
        let provider = provider(&server, None);

        let remote = provider
            .upload_page("/apps/inkwell/n1/p1.page", b"hello")
            .await
            .unwrap();
        assert_eq!(remote.file_id, "43");
        assert_eq!(remote.mtime, 1_700_000_300_000);
        let requests = server.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[3].target.contains("method=list"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_folder_posts_isdir_form() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"errno":0,"fs_id":9,"path":"/apps/inkwell/archive","mtime":1700000400}"#,
        )])
        .await;
        let provider = provider(&server, None);

        let folder = provider
            .create_folder("archive", Some("apps/inkwell/"))
            .await
            .unwrap();
        assert_eq!(folder.id, "9");
        assert_eq!(folder.path, "/apps/inkwell/archive");
        assert!(folder.is_folder);
        assert_eq!(folder.mtime, 1_700_000_400_000);

        let request = &server.requests()[0];
        assert_eq!(request.method, "POST");
        assert!(request.target.starts_with("/rest/2.0/xpan/file?method=create"));
        let form = request.body_text();
        assert!(form.contains("path=%2Fapps%2Finkwell%2Farchive"));
        assert!(form.contains("isdir=1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn download_follows_dlink() {
        let server = TestServer::start_with(|base| {
            vec![
                Reply::json(
                    200,
                    &format!(
                        r#"{{"errno":0,"list":[{{"fs_id":42,"path":"/a/p1.page","dlink":"{base}/file/p1"}}]}}"#
                    ),
                ),
                Reply::bytes(200, b"page bytes"),
            ]
        })
        .await;
        let provider = provider(&server, None);

        let bytes = provider.download_page("42").await.unwrap();
        assert_eq!(bytes, b"page bytes");
        let requests = server.requests();
        assert!(requests[0].target.contains("fsids=%5B42%5D"));
        assert!(requests[1].target.starts_with("/file/p1?access_token=token-1"));
        assert_eq!(requests[1].header("user-agent"), Some("pan.baidu.com"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_token_errno_refreshes_and_retries() {
        let token_server = TestServer::start(vec![Reply::json(
            200,
            r#"{"access_token":"token-2","refresh_token":"refresh-2","expires_in":2592000}"#,
        )])
        .await;
        let server = TestServer::start(vec![
            Reply::json(200, r#"{"errno":111,"errmsg":"access token invalid"}"#),
            Reply::json(200, r#"{"errno":0,"total":100,"used":40}"#),
        ])
        .await;
        let provider = provider(&server, Some(token_server.url("/oauth/2.0/token")));

        let quota = provider.quota().await.unwrap();
        assert_eq!(quota, Quota { used: 40, total: 100 });
        assert!(server.requests()[1].target.contains("access_token=token-2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_by_id_resolves_path_first() {
        let server = TestServer::start(vec![
            Reply::json(
                200,
                r#"{"errno":0,"list":[{"fs_id":7,"path":"/apps/inkwell/n1/p1.page"}]}"#,
            ),
            Reply::json(200, r#"{"errno":0,"info":[]}"#),
        ])
        .await;
        let provider = provider(&server, None);

        provider
            .delete_file(&FileRef::Id("7".to_string()))
            .await
            .unwrap();
        let requests = server.requests();
        assert!(requests[1].target.contains("opera=delete"));
        assert!(requests[1]
            .body_text()
            .contains("%2Fapps%2Finkwell%2Fn1%2Fp1.page"));
    }
}

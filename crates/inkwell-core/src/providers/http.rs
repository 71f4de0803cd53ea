//! Authenticated REST calls with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::auth::TokenManager;
use crate::config::SyncSettings;
use crate::util::compact_text;
use crate::{Error, Result};

/// Exponential backoff with jitter, applied to transient failures only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl RetryPolicy {
    pub const fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.retry_max_attempts,
            base_delay: settings.retry_base_delay(),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let backoff = self.base_delay.saturating_mul(2_u32.pow(exponent));
        let jitter_cap = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// HTTP client bound to one account's tokens.
pub struct ApiClient {
    client: Client,
    tokens: Arc<TokenManager>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(tokens: Arc<TokenManager>, settings: &SyncSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            tokens,
            retry: RetryPolicy::from_settings(settings),
        })
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Send the request built by `build` and hand a 2xx body to `parse`.
    ///
    /// A 401 (from the status line or from `parse`) triggers one token refresh
    /// and an immediate resend. Transient failures are retried per the policy;
    /// everything else is returned as-is.
    pub async fn call<T, B, P>(&self, operation: &str, build: B, parse: P) -> Result<T>
    where
        B: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
        P: Fn(&[u8]) -> Result<T> + Send + Sync,
        T: Send,
    {
        let mut attempt = 1;
        let mut refreshed = false;
        let mut token = self.tokens.access_token().await?;

        loop {
            tracing::debug!("{} (attempt {})", operation, attempt);
            let outcome = match build(&self.client, &token).send().await {
                Err(error) => Err(Error::Http(error)),
                Ok(response) => {
                    let status = response.status();
                    match response.bytes().await {
                        Err(error) => Err(Error::Http(error)),
                        Ok(body) if status.is_success() => parse(&body),
                        Ok(body) => Err(Error::Provider {
                            code: status.as_u16(),
                            message: parse_api_error(status, &String::from_utf8_lossy(&body)),
                        }),
                    }
                }
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded after {} attempts", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.status_code() == Some(401) && !refreshed {
                tracing::warn!("{} was unauthorized; refreshing token", operation);
                refreshed = true;
                token = self.tokens.force_refresh(&token).await?;
                continue;
            }

            if attempt < self.retry.max_attempts && error.is_transient() {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    "{} failed with transient error, retrying in {:?}: {}",
                    operation,
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(error);
        }
    }

    pub async fn json<T, B>(&self, operation: &str, build: B) -> Result<T>
    where
        T: DeserializeOwned + Send,
        B: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        self.call(operation, build, |body| Ok(serde_json::from_slice(body)?))
            .await
    }

    pub async fn bytes<B>(&self, operation: &str, build: B) -> Result<Vec<u8>>
    where
        B: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        self.call(operation, build, |body| Ok(body.to_vec())).await
    }

    pub async fn empty<B>(&self, operation: &str, build: B) -> Result<()>
    where
        B: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        self.call(operation, build, |_| Ok(())).await
    }
}

/// Extract a readable message from a provider error body.
pub fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = payload.get("error").and_then(|error| error.get("message"));
        let message = nested
            .or_else(|| payload.get("error_description"))
            .or_else(|| payload.get("errmsg"))
            .or_else(|| payload.get("message"))
            .or_else(|| payload.get("error"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return format!("{} ({})", compact_text(message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryCredentialStore, OAuthClient, TokenSet};
    use crate::config::OAuthAppConfig;
    use crate::models::ProviderKind;
    use crate::test_support::http::{Reply, TestServer};
    use crate::util::unix_timestamp_now;

    fn api(token_url: String, access: &str) -> ApiClient {
        api_with(token_url, access, &SyncSettings::default())
    }

    fn api_with(token_url: String, access: &str, settings: &SyncSettings) -> ApiClient {
        let mut app = OAuthAppConfig::new("client");
        app.token_url = Some(token_url);
        let oauth = OAuthClient::new(ProviderKind::OneDrive, app).unwrap();
        let tokens = Arc::new(TokenManager::new(
            "acct",
            oauth,
            Arc::new(MemoryCredentialStore::new()),
        ));
        tokens
            .install(&TokenSet {
                access_token: access.to_string(),
                refresh_token: "refresh".to_string(),
                expires_at: unix_timestamp_now() + 3_600,
                scope: None,
            })
            .unwrap();
        ApiClient::new(tokens, settings)
            .unwrap()
            .with_retry(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            })
    }

    #[test]
    fn parse_api_error_reads_graph_and_baidu_shapes() {
        assert_eq!(
            parse_api_error(
                StatusCode::NOT_FOUND,
                r#"{"error":{"code":"itemNotFound","message":"Item not found"}}"#
            ),
            "Item not found (404)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"errno":2,"errmsg":"param error"}"#),
            "param error (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        let first = policy.delay_for(1);
        let third = policy.delay_for(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_server_errors_until_success() {
        let server = TestServer::start(vec![
            Reply::json(503, r#"{"error":{"message":"busy"}}"#),
            Reply::json(200, r#"{"ok":true}"#),
        ])
        .await;
        let api = api(server.url("/token"), "live");
        let url = server.url("/me");

        let value: serde_json::Value = api
            .json("get profile", |client, token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(server.requests().len(), 2);
        assert_eq!(
            server.requests()[0].header("authorization"),
            Some("Bearer live")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_errors_are_not_retried() {
        let server = TestServer::start(vec![
            Reply::json(404, r#"{"error":{"message":"gone"}}"#),
            Reply::json(200, "{}"),
        ])
        .await;
        let api = api(server.url("/token"), "live");
        let url = server.url("/item");

        let error = api
            .empty("delete item", |client, token| client.delete(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Provider { code: 404, .. }));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_stop_after_max_attempts() {
        let server = TestServer::start(vec![
            Reply::empty(500),
            Reply::empty(500),
            Reply::empty(500),
            Reply::empty(200),
        ])
        .await;
        let api = api(server.url("/token"), "live");
        let url = server.url("/quota");

        let error = api
            .empty("quota", |client, token| client.get(&url).bearer_auth(token))
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), Some(500));
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthorized_refreshes_once_and_resends() {
        let token_server = TestServer::start(vec![Reply::json(
            200,
            r#"{"access_token":"renewed","expires_in":3600}"#,
        )])
        .await;
        let server = TestServer::start(vec![
            Reply::json(401, r#"{"error":{"message":"expired"}}"#),
            Reply::bytes(200, b"page body"),
        ])
        .await;
        let api = api(token_server.url("/token"), "stale");
        let url = server.url("/content");

        let body = api
            .bytes("download", |client, token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(body, b"page body");
        let requests = server.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer stale"));
        assert_eq!(requests[1].header("authorization"), Some("Bearer renewed"));
        assert_eq!(token_server.requests().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_calls_are_retried() {
        let server = TestServer::start(vec![
            Reply::stall(Duration::from_secs(3)),
            Reply::json(200, r#"{"ok":true}"#),
        ])
        .await;
        let settings = SyncSettings {
            request_timeout_secs: 1,
            ..SyncSettings::default()
        };
        let api = api_with(server.url("/token"), "live", &settings);
        let url = server.url("/me");

        let value: serde_json::Value = api
            .json("get profile", |client, token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_connections_are_retried() {
        let server = TestServer::start(vec![Reply::reset(), Reply::bytes(200, b"page body")]).await;
        let api = api(server.url("/token"), "live");
        let url = server.url("/content");

        let body = api
            .bytes("download", |client, token| client.get(&url).bearer_auth(token))
            .await
            .unwrap();
        assert_eq!(body, b"page body");
        assert_eq!(server.requests().len(), 2);
    }
}

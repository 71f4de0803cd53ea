//! Authorization-code flow and token refresh against a provider's OAuth server.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use super::loopback::{LoopbackListener, LOOPBACK_TIMEOUT};
use super::{AuthError, AuthResult, TokenSet};
use crate::config::OAuthAppConfig;
use crate::models::ProviderKind;
use crate::util::{compact_text, unix_timestamp_now};

const TOKEN_HTTP_TIMEOUT_SECS: u64 = 30;
/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3_600;

/// How the token endpoint expects its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequestStyle {
    /// `POST` with an `application/x-www-form-urlencoded` body
    Form,
    /// `GET` with the parameters in the query string
    Query,
}

/// OAuth server coordinates for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub scope: String,
    pub supports_pkce: bool,
    pub token_style: TokenRequestStyle,
}

impl OAuthEndpoints {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OneDrive => Self {
                authorize_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
                    .to_string(),
                token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string(),
                scope: "Files.ReadWrite offline_access User.Read".to_string(),
                supports_pkce: true,
                token_style: TokenRequestStyle::Form,
            },
            ProviderKind::BaiduPan => Self {
                authorize_url: "https://openapi.baidu.com/oauth/2.0/authorize".to_string(),
                token_url: "https://openapi.baidu.com/oauth/2.0/token".to_string(),
                scope: "basic,netdisk".to_string(),
                supports_pkce: false,
                token_style: TokenRequestStyle::Query,
            },
        }
    }

    /// Provider defaults with the app config's endpoint overrides applied.
    pub fn resolve(kind: ProviderKind, app: &OAuthAppConfig) -> Self {
        let mut endpoints = Self::for_provider(kind);
        if let Some(url) = &app.authorize_url {
            endpoints.authorize_url.clone_from(url);
        }
        if let Some(url) = &app.token_url {
            endpoints.token_url.clone_from(url);
        }
        endpoints
    }
}

/// A prepared authorize redirect and the secrets needed to finish it
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub redirect_uri: String,
    pkce_verifier: Option<String>,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthorizationRequest")
            .field("url", &self.url)
            .field("redirect_uri", &self.redirect_uri)
            .field("pkce_verifier", &self.pkce_verifier.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct OAuthClient {
    kind: ProviderKind,
    app: OAuthAppConfig,
    endpoints: OAuthEndpoints,
    client: Client,
}

impl OAuthClient {
    pub fn new(kind: ProviderKind, app: OAuthAppConfig) -> AuthResult<Self> {
        if app.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(format!(
                "{} client_id must not be empty",
                kind.display_name()
            )));
        }
        let endpoints = OAuthEndpoints::resolve(kind, &app);
        let client = Client::builder()
            .timeout(Duration::from_secs(TOKEN_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            kind,
            app,
            endpoints,
            client,
        })
    }

    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub const fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    /// Build the authorize URL with a fresh state (and PKCE pair when supported).
    pub fn authorization_request(&self, redirect_uri: &str) -> AuthResult<AuthorizationRequest> {
        let state = random_token(16);
        let mut params = vec![
            ("response_type", "code".to_string()),
            ("client_id", self.app.client_id.clone()),
            ("redirect_uri", redirect_uri.to_string()),
            ("scope", self.endpoints.scope.clone()),
            ("state", state.clone()),
        ];

        let pkce_verifier = if self.endpoints.supports_pkce {
            let verifier = random_token(32);
            params.push(("code_challenge", pkce_challenge(&verifier)));
            params.push(("code_challenge_method", "S256".to_string()));
            Some(verifier)
        } else {
            None
        };
        if self.kind == ProviderKind::BaiduPan {
            params.push(("display", "popup".to_string()));
        }

        let url = Url::parse_with_params(&self.endpoints.authorize_url, &params)
            .map_err(|error| AuthError::InvalidConfiguration(error.to_string()))?;

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
            redirect_uri: redirect_uri.to_string(),
            pkce_verifier,
        })
    }

    /// Run the full browser sign-in: bind the loopback listener, hand the
    /// authorize URL to `launch`, wait for the redirect, exchange the code.
    pub async fn authorize_with<F>(&self, launch: F) -> AuthResult<TokenSet>
    where
        F: FnOnce(&str) -> std::io::Result<()>,
    {
        self.authorize_with_timeout(launch, LOOPBACK_TIMEOUT).await
    }

    pub async fn authorize_with_timeout<F>(
        &self,
        launch: F,
        timeout: Duration,
    ) -> AuthResult<TokenSet>
    where
        F: FnOnce(&str) -> std::io::Result<()>,
    {
        let listener = LoopbackListener::bind(self.app.redirect_port).await?;
        let request = self.authorization_request(&listener.redirect_uri())?;

        tracing::info!(
            "Opening {} sign-in in the browser",
            self.kind.display_name()
        );
        if let Err(error) = launch(&request.url) {
            tracing::warn!(
                "Failed to open browser ({}); visit this URL to continue: {}",
                error,
                request.url
            );
        }

        let code = listener.wait_for_code(&request.state, timeout).await?;
        self.exchange_code(&code, &request).await
    }

    /// Interactive sign-in using the system browser.
    pub async fn authorize_in_browser(&self) -> AuthResult<TokenSet> {
        self.authorize_with(|url| open::that(url)).await
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        request: &AuthorizationRequest,
    ) -> AuthResult<TokenSet> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", request.redirect_uri.clone()),
        ];
        if let Some(verifier) = &request.pkce_verifier {
            params.push(("code_verifier", verifier.clone()));
        }

        let response = self.send_token_request(params).await?;
        response.into_token_set(None).ok_or_else(|| {
            AuthError::TokenExchange("Token response did not include a refresh token".to_string())
        })
    }

    /// Exchange a refresh token; a response without a new refresh token keeps
    /// the old one.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenSet> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidGrant(
                "Refresh token must not be empty".to_string(),
            ));
        }
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        let response = self.send_token_request(params).await?;
        response
            .into_token_set(Some(refresh_token))
            .ok_or_else(|| AuthError::TokenExchange("Refresh response was incomplete".to_string()))
    }

    async fn send_token_request(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> AuthResult<TokenResponse> {
        params.push(("client_id", self.app.client_id.clone()));
        if let Some(secret) = &self.app.client_secret {
            params.push(("client_secret", secret.clone()));
        }
        if self.kind == ProviderKind::OneDrive {
            params.push(("scope", self.endpoints.scope.clone()));
        }

        let request = match self.endpoints.token_style {
            TokenRequestStyle::Form => self.client.post(&self.endpoints.token_url).form(&params),
            TokenRequestStyle::Query => self.client.get(&self.endpoints.token_url).query(&params),
        };

        tracing::debug!("Requesting {} token", self.kind.display_name());
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_token_error(status, &body));
        }

        let payload = serde_json::from_str::<TokenResponse>(&body)?;
        // Baidu reports some failures with HTTP 200 and an error body.
        if let Some(error) = payload.error.clone() {
            return Err(classify_token_error(
                &error,
                payload.error_description.as_deref(),
                status,
            ));
        }
        Ok(payload)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, previous_refresh: Option<&str>) -> Option<TokenSet> {
        let access_token = self.access_token?;
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))?;
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Some(TokenSet {
            access_token,
            refresh_token,
            expires_at: unix_timestamp_now().saturating_add(expires_in),
            scope: self.scope,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

fn parse_token_error(status: StatusCode, body: &str) -> AuthError {
    if let Ok(payload) = serde_json::from_str::<TokenErrorResponse>(body) {
        if let Some(error) = payload.error {
            return classify_token_error(&error, payload.error_description.as_deref(), status);
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        AuthError::TokenExchange(format!("HTTP {}", status.as_u16()))
    } else {
        AuthError::TokenExchange(format!("{trimmed} ({})", status.as_u16()))
    }
}

fn classify_token_error(error: &str, description: Option<&str>, status: StatusCode) -> AuthError {
    let detail = description.map_or_else(
        || format!("{error} ({})", status.as_u16()),
        |description| format!("{error}: {} ({})", compact_text(description), status.as_u16()),
    );
    match error {
        "invalid_grant" | "expired_token" => AuthError::InvalidGrant(detail),
        _ => AuthError::TokenExchange(detail),
    }
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::http::{Reply, TestServer};

    fn onedrive_client(token_url: Option<String>) -> OAuthClient {
        let mut app = OAuthAppConfig::new("client-1");
        app.redirect_port = 0;
        app.token_url = token_url;
        OAuthClient::new(ProviderKind::OneDrive, app).unwrap()
    }

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        query_pairs(url)
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let client = onedrive_client(None);
        let request = client
            .authorization_request("http://127.0.0.1:5000/callback")
            .unwrap();
        assert!(request
            .url
            .starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"));
        assert_eq!(query_value(&request.url, "state"), Some(request.state.clone()));
        assert_eq!(
            query_value(&request.url, "code_challenge_method").as_deref(),
            Some("S256")
        );
        let verifier = request.pkce_verifier.clone().unwrap();
        assert_eq!(
            query_value(&request.url, "code_challenge"),
            Some(pkce_challenge(&verifier))
        );
        assert!(query_value(&request.url, "scope")
            .unwrap()
            .contains("offline_access"));
    }

    #[test]
    fn baidu_authorize_url_has_no_pkce() {
        let mut app = OAuthAppConfig::new("app-key");
        app.client_secret = Some("secret".to_string());
        let client = OAuthClient::new(ProviderKind::BaiduPan, app).unwrap();
        let request = client
            .authorization_request("http://127.0.0.1:5000/callback")
            .unwrap();
        assert!(query_value(&request.url, "code_challenge").is_none());
        assert_eq!(
            query_value(&request.url, "scope").as_deref(),
            Some("basic,netdisk")
        );
    }

    #[test]
    fn invalid_grant_is_classified() {
        let error = parse_token_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"token revoked"}"#,
        );
        assert!(matches!(error, AuthError::InvalidGrant(message) if message.contains("revoked")));
        let other = parse_token_error(StatusCode::BAD_REQUEST, r#"{"error":"invalid_client"}"#);
        assert!(matches!(other, AuthError::TokenExchange(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_keeps_old_refresh_token_when_omitted() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"access_token":"new-access","expires_in":3600}"#,
        )])
        .await;
        let client = onedrive_client(Some(server.url("/token")));

        let tokens = client.refresh("old-refresh").await.unwrap();
        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token, "old-refresh");
        assert!(!tokens.is_expired());

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert!(requests[0].body_text().contains("grant_type=refresh_token"));
        assert!(requests[0].body_text().contains("refresh_token=old-refresh"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn browser_flow_exchanges_code_with_verifier() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600,"scope":"Files.ReadWrite"}"#,
        )])
        .await;
        let client = onedrive_client(Some(server.url("/token")));

        let tokens = client
            .authorize_with_timeout(
                |url| {
                    let redirect = query_value(url, "redirect_uri").unwrap_or_default();
                    let state = query_value(url, "state").unwrap_or_default();
                    tokio::spawn(async move {
                        let _ = reqwest::get(format!("{redirect}?code=auth-code&state={state}"))
                            .await;
                    });
                    Ok(())
                },
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "a1");
        assert_eq!(tokens.refresh_token, "r1");
        let body = server.requests()[0].body_text();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=auth-code"));
        assert!(body.contains("code_verifier="));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn baidu_token_request_uses_query_string() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"access_token":"a1","refresh_token":"r2","expires_in":2592000}"#,
        )])
        .await;
        let mut app = OAuthAppConfig::new("app-key");
        app.client_secret = Some("app-secret".to_string());
        app.token_url = Some(server.url("/oauth/2.0/token"));
        let client = OAuthClient::new(ProviderKind::BaiduPan, app).unwrap();

        let tokens = client.refresh("r1").await.unwrap();
        assert_eq!(tokens.refresh_token, "r2");
        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert!(request.target.contains("client_secret=app-secret"));
    }
}

//! Sync preferences and OAuth application configuration.
//!
//! `SyncSettings` is what the user toggles in the sync panel. `OAuthAppConfig`
//! carries the registered application credentials for each provider; these are
//! read from the environment or from the client's config file, never from the
//! database.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::ProviderKind;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const MIN_DEBOUNCE_MS: u64 = 2_000;
const MAX_DEBOUNCE_MS: u64 = 5_000;
const MIN_CONCURRENT_CALLS: usize = 1;
const MAX_CONCURRENT_CALLS: usize = 8;
const DEFAULT_REDIRECT_PORT: u16 = 53_682;

/// User-facing sync preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Only automatic syncs are restricted; manual page commits run on any connection
    pub wifi_only: bool,
    /// Keep the discarded side of a conflict as a `.conflict` file
    pub save_conflict_copy: bool,
    pub auto_commit_debounce_ms: u64,
    pub max_concurrent_calls: usize,
    pub request_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub network_poll_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            wifi_only: false,
            save_conflict_copy: true,
            auto_commit_debounce_ms: 3_000,
            max_concurrent_calls: 4,
            request_timeout_secs: 30,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            network_poll_interval_secs: 15,
        }
    }
}

impl SyncSettings {
    /// Clamp values into the ranges the orchestrator supports.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.auto_commit_debounce_ms = self
            .auto_commit_debounce_ms
            .clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        self.max_concurrent_calls = self
            .max_concurrent_calls
            .clamp(MIN_CONCURRENT_CALLS, MAX_CONCURRENT_CALLS);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.retry_max_attempts = self.retry_max_attempts.max(1);
        self.network_poll_interval_secs = self.network_poll_interval_secs.max(1);
        self
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.auto_commit_debounce_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub const fn network_poll_interval(&self) -> Duration {
        Duration::from_secs(self.network_poll_interval_secs)
    }
}

/// Registered OAuth application for one provider.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthAppConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    /// Overrides the provider's authorize endpoint
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// Overrides the provider's token endpoint
    #[serde(default)]
    pub token_url: Option<String>,
    /// Overrides the provider's REST base URL
    #[serde(default)]
    pub api_base_url: Option<String>,
}

const fn default_redirect_port() -> u16 {
    DEFAULT_REDIRECT_PORT
}

impl std::fmt::Debug for OAuthAppConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OAuthAppConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_port", &self.redirect_port)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl OAuthAppConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_port: DEFAULT_REDIRECT_PORT,
            authorize_url: None,
            token_url: None,
            api_base_url: None,
        }
    }

    /// Loopback redirect registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }

    /// Load from `INKWELL_<PROVIDER>_CLIENT_ID` / `_CLIENT_SECRET`.
    pub fn from_env(kind: ProviderKind) -> Result<Option<Self>> {
        Self::from_lookup(kind, |key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable source.
    ///
    /// Returns `Ok(None)` when nothing is set. A secret without a client id is
    /// a partial configuration and is rejected.
    pub fn from_lookup(
        kind: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>> {
        let prefix = env_prefix(kind);
        let client_id = normalize_text_option(lookup(&format!("{prefix}_CLIENT_ID")));
        let client_secret = normalize_text_option(lookup(&format!("{prefix}_CLIENT_SECRET")));
        let redirect_port = normalize_text_option(lookup(&format!("{prefix}_REDIRECT_PORT")));

        let Some(client_id) = client_id else {
            if client_secret.is_some() || redirect_port.is_some() {
                return Err(Error::InvalidInput(format!(
                    "Partial {} OAuth configuration: set {prefix}_CLIENT_ID",
                    kind.display_name()
                )));
            }
            return Ok(None);
        };

        let mut config = Self::new(client_id);
        config.client_secret = client_secret;
        if let Some(port) = redirect_port {
            config.redirect_port = port.parse().map_err(|_| {
                Error::InvalidInput(format!("{prefix}_REDIRECT_PORT must be a port number"))
            })?;
        }
        config.validate(kind)?;
        Ok(Some(config))
    }

    /// Baidu's token endpoint requires the secret; OneDrive public clients do not.
    pub fn validate(&self, kind: ProviderKind) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} client_id must not be empty",
                kind.display_name()
            )));
        }
        if kind == ProviderKind::BaiduPan && self.client_secret.is_none() {
            return Err(Error::InvalidInput(
                "Baidu Pan requires INKWELL_BAIDU_CLIENT_SECRET".to_string(),
            ));
        }
        for url in [&self.authorize_url, &self.token_url, &self.api_base_url]
            .into_iter()
            .flatten()
        {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(format!(
                    "Endpoint override must include http:// or https://: {url}"
                )));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.client_id = self.client_id.trim().to_string();
        self.client_secret = normalize_text_option(self.client_secret.take());
        self.authorize_url = normalize_endpoint(self.authorize_url.take());
        self.token_url = normalize_endpoint(self.token_url.take());
        self.api_base_url = normalize_endpoint(self.api_base_url.take());
    }
}

fn normalize_endpoint(value: Option<String>) -> Option<String> {
    normalize_text_option(value).map(|url| url.trim_end_matches('/').to_string())
}

const fn env_prefix(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OneDrive => "INKWELL_ONEDRIVE",
        ProviderKind::BaiduPan => "INKWELL_BAIDU",
    }
}

/// OAuth applications for every supported provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderAppConfigs {
    #[serde(default)]
    pub onedrive: Option<OAuthAppConfig>,
    #[serde(default)]
    pub baidupan: Option<OAuthAppConfig>,
}

impl ProviderAppConfigs {
    pub const fn get(&self, kind: ProviderKind) -> Option<&OAuthAppConfig> {
        match kind {
            ProviderKind::OneDrive => self.onedrive.as_ref(),
            ProviderKind::BaiduPan => self.baidupan.as_ref(),
        }
    }

    /// Configured app for `kind`, or `AuthError::NotConfigured`.
    pub fn require(&self, kind: ProviderKind) -> Result<&OAuthAppConfig> {
        self.get(kind)
            .ok_or_else(|| crate::auth::AuthError::NotConfigured(kind.display_name().to_string()).into())
    }

    /// Environment values take precedence over file values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(config) = OAuthAppConfig::from_env(ProviderKind::OneDrive)? {
            self.onedrive = Some(config);
        }
        if let Some(config) = OAuthAppConfig::from_env(ProviderKind::BaiduPan)? {
            self.baidupan = Some(config);
        }
        Ok(self)
    }

    pub fn normalize(&mut self) {
        for config in [&mut self.onedrive, &mut self.baidupan].into_iter().flatten() {
            config.normalize();
        }
    }
}

//! OAuth token lifecycle for cloud accounts.
//!
//! `OAuthClient` runs the authorization-code flow (PKCE where the provider
//! supports it) and token refresh. `TokenManager` owns one account's tokens
//! and serializes refreshes so concurrent calls never race a refresh-token
//! rotation.

mod loopback;
mod oauth;
mod tokens;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loopback::{CallbackParams, LoopbackListener, LOOPBACK_TIMEOUT};
pub use oauth::{AuthorizationRequest, OAuthClient, OAuthEndpoints, TokenRequestStyle};
pub use tokens::TokenManager;

use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} sign-in is not configured for this build")]
    NotConfigured(String),
    #[error("OAuth app configuration is invalid: {0}")]
    InvalidConfiguration(String),
    #[error("Sign-in was cancelled")]
    Cancelled,
    #[error("Loopback listener failed: {0}")]
    Listener(#[from] std::io::Error),
    #[error("Timed out waiting for the browser redirect")]
    Timeout,
    #[error("OAuth state did not match; the redirect was not ours")]
    StateMismatch,
    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed token payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    #[error("Refresh token rejected: {0}")]
    InvalidGrant(String),
    #[error("Keychain access failed: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Access + refresh token pair for one account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// True when the token expires within the safety margin.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Where account tokens are persisted, keyed by account id.
pub trait CredentialStore: Send + Sync + 'static {
    fn load_tokens(&self, account_id: &str) -> AuthResult<Option<TokenSet>>;
    fn save_tokens(&self, account_id: &str, tokens: &TokenSet) -> AuthResult<()>;
    fn clear_tokens(&self, account_id: &str) -> AuthResult<()>;
}

/// Process-local token store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    tokens: Arc<Mutex<HashMap<String, TokenSet>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_tokens(&self, account_id: &str) -> AuthResult<Option<TokenSet>> {
        Ok(self.tokens.lock().get(account_id).cloned())
    }

    fn save_tokens(&self, account_id: &str, tokens: &TokenSet) -> AuthResult<()> {
        self.tokens
            .lock()
            .insert(account_id.to_string(), tokens.clone());
        Ok(())
    }

    fn clear_tokens(&self, account_id: &str) -> AuthResult<()> {
        self.tokens.lock().remove(account_id);
        Ok(())
    }
}

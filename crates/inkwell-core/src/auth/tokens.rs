//! Per-account token cache with serialized refresh.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{AuthError, CredentialStore, OAuthClient, TokenSet};
use crate::{Error, Result};

/// Owns one account's tokens.
///
/// Only one refresh runs at a time; callers that arrive while a refresh is in
/// flight wait on the lock and then reuse the refreshed token.
pub struct TokenManager {
    account_id: String,
    oauth: OAuthClient,
    store: Arc<dyn CredentialStore>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        account_id: impl Into<String>,
        oauth: OAuthClient,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            oauth,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub const fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Run the interactive browser sign-in and persist the new tokens.
    pub async fn sign_in(&self) -> Result<TokenSet> {
        let tokens = self.oauth.authorize_in_browser().await?;
        self.store.save_tokens(&self.account_id, &tokens)?;
        Ok(tokens)
    }

    /// Persist tokens obtained elsewhere (tests, imported sessions).
    pub fn install(&self, tokens: &TokenSet) -> Result<()> {
        self.store.save_tokens(&self.account_id, tokens)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear_tokens(&self.account_id)?;
        Ok(())
    }

    /// A usable access token, refreshing first when expiry is near.
    pub async fn access_token(&self) -> Result<String> {
        let tokens = self.load()?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        let tokens = self.load()?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }
        Ok(self.refresh_locked(&tokens).await?.access_token)
    }

    /// Refresh after the server rejected `rejected_access_token` with 401.
    ///
    /// If another task already replaced that token, its result is reused.
    pub async fn force_refresh(&self, rejected_access_token: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        let tokens = self.load()?;
        if tokens.access_token != rejected_access_token {
            return Ok(tokens.access_token);
        }
        Ok(self.refresh_locked(&tokens).await?.access_token)
    }

    pub async fn refresh_if_expired(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    fn load(&self) -> Result<TokenSet> {
        self.store
            .load_tokens(&self.account_id)?
            .ok_or_else(|| Error::ReauthRequired {
                account_id: self.account_id.clone(),
            })
    }

    async fn refresh_locked(&self, current: &TokenSet) -> Result<TokenSet> {
        tracing::debug!("Refreshing access token for account {}", self.account_id);
        match self.oauth.refresh(&current.refresh_token).await {
            Ok(tokens) => {
                self.store.save_tokens(&self.account_id, &tokens)?;
                Ok(tokens)
            }
            Err(AuthError::InvalidGrant(message)) => {
                tracing::warn!(
                    "Refresh token rejected for account {}: {}",
                    self.account_id,
                    message
                );
                Err(Error::ReauthRequired {
                    account_id: self.account_id.clone(),
                })
            }
            Err(AuthError::Http(error)) => Err(Error::Http(error)),
            Err(error) => Err(error.into()),
        }
    }
}

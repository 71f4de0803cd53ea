//! Account tokens in the OS keychain.
//!
//! Test builds swap the keychain for a process-wide map so the suite never
//! touches the user's real credentials.

use inkwell_core::auth::{AuthError, AuthResult, CredentialStore, TokenSet};

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub const fn new() -> Self {
        Self
    }
}

fn entry_name(account_id: &str) -> String {
    format!("account_tokens:{account_id}")
}

fn storage_error(error: impl std::fmt::Display) -> AuthError {
    AuthError::SecureStorage(error.to_string())
}

#[cfg(not(test))]
mod backend {
    use keyring::Entry;

    use super::{entry_name, storage_error};
    use inkwell_core::auth::AuthResult;

    const SERVICE: &str = "inkwell";

    fn entry(account_id: &str) -> AuthResult<Entry> {
        Entry::new(SERVICE, &entry_name(account_id)).map_err(storage_error)
    }

    pub fn read(account_id: &str) -> AuthResult<Option<String>> {
        match entry(account_id)?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(storage_error(error)),
        }
    }

    pub fn write(account_id: &str, raw: &str) -> AuthResult<()> {
        entry(account_id)?.set_password(raw).map_err(storage_error)
    }

    pub fn delete(account_id: &str) -> AuthResult<()> {
        match entry(account_id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(storage_error(error)),
        }
    }
}


impl CredentialStore for KeyringCredentialStore {
    fn load_tokens(&self, account_id: &str) -> AuthResult<Option<TokenSet>> {
        backend::read(account_id)?
            .map(|raw| serde_json::from_str(&raw).map_err(AuthError::from))
            .transpose()
    }

    fn save_tokens(&self, account_id: &str, tokens: &TokenSet) -> AuthResult<()> {
        backend::write(account_id, &serde_json::to_string(tokens)?)
    }

    fn clear_tokens(&self, account_id: &str) -> AuthResult<()> {
        backend::delete(account_id)
    }
}

//! Remote account model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Supported cloud drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Microsoft OneDrive (path/etag addressing)
    #[serde(rename = "onedrive")]
    OneDrive,
    /// Baidu Pan (numeric file-id addressing)
    #[serde(rename = "baidupan")]
    BaiduPan,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDrive => "onedrive",
            Self::BaiduPan => "baidupan",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OneDrive => "OneDrive",
            Self::BaiduPan => "Baidu Pan",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onedrive" | "one_drive" => Ok(Self::OneDrive),
            "baidupan" | "baidu_pan" | "baidu" => Ok(Self::BaiduPan),
            other => Err(Error::InvalidInput(format!("Unknown provider: {other}"))),
        }
    }
}

/// Profile of the signed-in cloud user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Provider-side user identifier
    pub id: String,
    /// Name shown in account pickers
    pub display_name: String,
    /// Email, when the provider exposes one
    pub email: Option<String>,
}

/// An authenticated cloud account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    /// Unique identifier (UUID v7)
    pub id: String,
    /// Which drive this account belongs to
    pub provider: ProviderKind,
    /// Label for the UI
    pub display_name: String,
    /// False once the refresh token has been rejected
    pub connected: bool,
    /// At most one account is the default
    pub is_default: bool,
    /// Cached profile
    pub user_info: Option<UserInfo>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl RemoteAccount {
    /// Create a connected, non-default account record
    #[must_use]
    pub fn new(provider: ProviderKind, user_info: Option<UserInfo>) -> Self {
        let display_name = user_info.as_ref().map_or_else(
            || provider.display_name().to_string(),
            |info| format!("{} ({})", info.display_name, provider.display_name()),
        );
        Self {
            id: new_account_id(),
            provider,
            display_name,
            connected: true,
            is_default: false,
            user_info,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Allocate an account id before the OAuth flow runs, so tokens can be
/// stored under it.
#[must_use]
pub fn new_account_id() -> String {
    Uuid::now_v7().to_string()
}

/// Storage usage reported by a provider, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub used: u64,
    pub total: u64,
}

impl Quota {
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("OneDrive".parse::<ProviderKind>().unwrap(), ProviderKind::OneDrive);
        assert_eq!("baidu".parse::<ProviderKind>().unwrap(), ProviderKind::BaiduPan);
        assert!("dropbox".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn provider_kind_serializes_as_str() {
        let json = serde_json::to_string(&ProviderKind::BaiduPan).unwrap();
        assert_eq!(json, "\"baidupan\"");
    }

    #[test]
    fn new_account_uses_user_name() {
        let account = RemoteAccount::new(
            ProviderKind::OneDrive,
            Some(UserInfo {
                id: "u1".to_string(),
                display_name: "Ada".to_string(),
                email: None,
            }),
        );
        assert!(account.connected);
        assert!(!account.is_default);
        assert_eq!(account.display_name, "Ada (OneDrive)");
    }

    #[test]
    fn quota_remaining_saturates() {
        let quota = Quota { used: 10, total: 5 };
        assert_eq!(quota.remaining(), 0);
    }
}

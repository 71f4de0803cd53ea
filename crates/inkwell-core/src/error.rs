//! Error types for inkwell-core

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias using inkwell-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in inkwell-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Initial login or token exchange failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Refresh token was rejected; the account must be reconnected
    #[error("Account {account_id} must be reconnected")]
    ReauthRequired { account_id: String },

    /// Remote API answered with an error status
    #[error("Provider error {code}: {message}")]
    Provider { code: u16, message: String },

    /// Transport-level failure (timeout, refused connection, reset)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No usable connectivity for this sync attempt
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Reading or writing a local page or conflict copy failed
    #[error("Local IO error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// First reconciliation of a note needs an explicit strategy
    #[error("Note {note_id} exists locally and in the cloud; choose an initial sync strategy")]
    InitialStrategyRequired { note_id: String },

    /// Resolution requested for a page that is not in conflict
    #[error("No pending conflict for page {page_id}")]
    NoPendingConflict { page_id: String },

    /// Sync was cancelled before the operation was scheduled
    #[error("Sync cancelled")]
    Cancelled,
}

/// Whether an I/O error somewhere in the cause chain means the peer
/// dropped the connection mid-request.
fn dropped_connection(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut cause = error.source();
    while let Some(current) = cause {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            );
        }
        cause = current.source();
    }
    false
}

impl Error {
    /// Whether the retry policy may repeat the failed call.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { code, .. } => (500..600).contains(code),
            Self::Http(error) => {
                if error.is_timeout() || error.is_connect() {
                    return true;
                }
                if let Some(status) = error.status() {
                    return status.is_server_error();
                }
                dropped_connection(error)
            }
            _ => false,
        }
    }

    /// Classify this error for per-page reporting.
    pub const fn kind(&self) -> PageErrorKind {
        match self {
            Self::Auth(_) => PageErrorKind::Auth,
            Self::ReauthRequired { .. } => PageErrorKind::ReauthRequired,
            Self::Provider { .. } | Self::Http(_) => PageErrorKind::Provider,
            Self::NetworkUnavailable => PageErrorKind::NetworkUnavailable,
            Self::LocalIo { .. } | Self::Io(_) => PageErrorKind::LocalIo,
            Self::Cancelled => PageErrorKind::Cancelled,
            Self::Database(_) | Self::LibSql(_) | Self::Serialization(_) => PageErrorKind::Storage,
            Self::NotFound(_)
            | Self::InvalidInput(_)
            | Self::InitialStrategyRequired { .. }
            | Self::NoPendingConflict { .. } => PageErrorKind::Internal,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { code, .. } => Some(*code),
            Self::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }
}

/// Serializable classification of a failed page sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorKind {
    Auth,
    ReauthRequired,
    Provider,
    NetworkUnavailable,
    LocalIo,
    Storage,
    Cancelled,
    Internal,
}

impl PageErrorKind {
    /// Transient failures show a retry affordance in the UI.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Provider | Self::NetworkUnavailable | Self::LocalIo)
    }
}

/// A page-level failure folded into a batch result.
///
/// Cloneable so that coalesced requests for the same page share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub note_id: String,
    pub page_id: String,
    pub kind: PageErrorKind,
    pub message: String,
}

impl PageError {
    pub fn from_error(note_id: &str, page_id: &str, error: &Error) -> Self {
        Self {
            note_id: note_id.to_string(),
            page_id: page_id.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn internal(note_id: &str, page_id: &str, message: impl Into<String>) -> Self {
        Self {
            note_id: note_id.to_string(),
            page_id: page_id.to_string(),
            kind: PageErrorKind::Internal,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PageError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}/{}: {}",
            self.note_id, self.page_id, self.message
        )
    }
}

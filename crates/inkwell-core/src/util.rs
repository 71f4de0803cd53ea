//! Small helpers shared by providers, auth and the sync engine.

use sha2::{Digest, Sha256};

/// Longest provider error body quoted back to the user.
const MAX_ERROR_SNIPPET: usize = 180;

/// Trimmed text, or `None` when nothing is left.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Shorten a provider response body for inclusion in an error.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(MAX_ERROR_SNIPPET).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SHA-256 of page content, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Join remote path segments with a single `/`, keeping a leading slash.
pub fn join_remote_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Normalize a user-supplied remote folder to `/a/b` form (`/` for root).
pub fn normalize_remote_folder(value: &str) -> String {
    let segments = value
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

use inkwell_core::events::SyncEvent;
use inkwell_core::models::{
    CloudFolderItem, PageOutcome, PageSyncStatus, Quota, RemoteAccount, SyncConfig, SyncResult,
};

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn format_quota(quota: &Quota) -> String {
    let percent = if quota.total == 0 {
        0.0
    } else {
        quota.used as f64 * 100.0 / quota.total as f64
    };
    format!(
        "{} of {} used ({percent:.1}%)",
        format_bytes(quota.used),
        format_bytes(quota.total)
    )
}

pub fn format_account_lines(accounts: &[RemoteAccount]) -> Vec<String> {
    accounts
        .iter()
        .map(|account| {
            let marker = if account.is_default { "*" } else { " " };
            let state = if account.connected {
                "connected"
            } else {
                "needs reauthorization"
            };
            let email = account
                .user_info
                .as_ref()
                .and_then(|user| user.email.as_deref())
                .unwrap_or("-");
            format!(
                "{marker} {:<36}  {:<9}  {:<24}  {email:<28}  {state}",
                account.id,
                account.provider.as_str(),
                account.display_name
            )
        })
        .collect()
}

pub fn format_note_lines(configs: &[SyncConfig]) -> Vec<String> {
    configs
        .iter()
        .map(|config| {
            let mode = if config.auto_commit { "auto" } else { "manual" };
            let enabled = if config.enabled { "enabled" } else { "paused" };
            let first_sync = config
                .initial_sync_at
                .map_or_else(|| "never synced".to_string(), format_timestamp);
            format!(
                "{:<24}  {:<36}  {:<20}  {mode:<6}  {enabled:<7}  {first_sync}",
                config.note_id,
                config.account_id,
                config.note_folder()
            )
        })
        .collect()
}

pub fn format_folder_lines(items: &[CloudFolderItem]) -> Vec<String> {
    let mut sorted: Vec<&CloudFolderItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.is_folder.cmp(&a.is_folder).then_with(|| a.name.cmp(&b.name)));
    sorted
        .into_iter()
        .map(|item| {
            if item.is_folder {
                format!("{}/", item.name)
            } else {
                let size = item.size.map_or_else(|| "-".to_string(), format_bytes);
                format!(
                    "{:<40}  {size:>10}  {}",
                    item.name,
                    format_timestamp(item.mtime)
                )
            }
        })
        .collect()
}

pub fn format_status_lines<'a>(
    statuses: impl IntoIterator<Item = (&'a String, &'a PageSyncStatus)>,
) -> Vec<String> {
    statuses
        .into_iter()
        .map(|(page_id, status)| format!("{page_id:<36}  {status}"))
        .collect()
}

pub fn describe_outcome(outcome: &PageOutcome) -> String {
    match outcome {
        PageOutcome::Synced => "Already in sync".to_string(),
        PageOutcome::Skipped => "No changes since the last sync".to_string(),
        PageOutcome::Uploaded => "Uploaded".to_string(),
        PageOutcome::Downloaded => "Downloaded".to_string(),
        PageOutcome::Adopted => "Both sides match; baseline recorded".to_string(),
        PageOutcome::DeletedRemote => "Deleted from the cloud".to_string(),
        PageOutcome::DeletedLocal => "Deleted locally".to_string(),
        PageOutcome::Conflict(summary) => format!(
            "Conflict: local edited {}, cloud edited {}. Resolve with `inkwell conflicts resolve {} {} <keep-local|keep-cloud|keep-both>`",
            format_timestamp(summary.local_mtime),
            format_timestamp(summary.cloud_mtime),
            summary.note_id,
            summary.page_id
        ),
        PageOutcome::Deferred => "Offline; the page stays pending".to_string(),
    }
}

pub fn format_sync_result_lines(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!(
        "uploaded={} downloaded={} deleted={} unchanged={}",
        result.uploaded, result.downloaded, result.deleted, result.skipped
    )];
    for conflict in &result.conflicts {
        lines.push(format!(
            "conflict  {}/{}  local {}  cloud {}",
            conflict.note_id,
            conflict.page_id,
            format_timestamp(conflict.local_mtime),
            format_timestamp(conflict.cloud_mtime)
        ));
    }
    for error in &result.errors {
        lines.push(format!("error     {error}"));
    }
    for note_id in &result.needs_strategy {
        lines.push(format!(
            "strategy  {note_id}  has pages on both sides; re-run with --strategy"
        ));
    }
    if result.cancelled {
        lines.push("Sync was cancelled before every page ran".to_string());
    }
    lines
}

pub fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::SyncProgress {
            account_id,
            current,
            total,
        } => format!("[{account_id}] {current}/{total} pages"),
        SyncEvent::SyncComplete { account_id, result } => format!(
            "[{account_id}] sync complete: {}",
            format_sync_result_lines(result).join("; ")
        ),
        SyncEvent::SyncError { account_id, error } => format!("[{account_id}] error: {error}"),
        SyncEvent::NetworkStatusChange { status } => {
            if status.online {
                format!("network: online ({})", status.connection_type.as_str())
            } else {
                "network: offline".to_string()
            }
        }
        SyncEvent::ConflictDetected { info } => format!(
            "[{}] conflict on {}/{}",
            info.account_id, info.note_id, info.page_id
        ),
        SyncEvent::PageStatus { key, status } => {
            format!("[{}] {}/{}: {status}", key.account_id, key.note_id, key.page_id)
        }
        SyncEvent::AccountChanged {
            account_id,
            connected,
        } => {
            if *connected {
                format!("[{account_id}] account connected")
            } else {
                format!("[{account_id}] account needs reauthorization or was removed")
            }
        }
    }
}

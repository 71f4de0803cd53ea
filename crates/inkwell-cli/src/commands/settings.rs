use inkwell_core::config::SyncSettings;

use crate::app::App;
use crate::cli::SettingsCommands;
use crate::error::CliError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettingsChanges {
    pub wifi_only: Option<bool>,
    pub save_conflict_copy: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub max_concurrent_calls: Option<usize>,
}

impl SettingsChanges {
    pub const fn is_empty(&self) -> bool {
        self.wifi_only.is_none()
            && self.save_conflict_copy.is_none()
            && self.debounce_ms.is_none()
            && self.max_concurrent_calls.is_none()
    }
}

pub fn apply_settings_changes(mut settings: SyncSettings, changes: SettingsChanges) -> SyncSettings {
    if let Some(wifi_only) = changes.wifi_only {
        settings.wifi_only = wifi_only;
    }
    if let Some(save_conflict_copy) = changes.save_conflict_copy {
        settings.save_conflict_copy = save_conflict_copy;
    }
    if let Some(debounce_ms) = changes.debounce_ms {
        settings.auto_commit_debounce_ms = debounce_ms;
    }
    if let Some(max_concurrent_calls) = changes.max_concurrent_calls {
        settings.max_concurrent_calls = max_concurrent_calls;
    }
    settings.validated()
}

pub fn format_settings_lines(settings: &SyncSettings) -> Vec<String> {
    vec![
        format!("wifi_only              {}", settings.wifi_only),
        format!("save_conflict_copy     {}", settings.save_conflict_copy),
        format!("auto_commit_debounce   {} ms", settings.auto_commit_debounce_ms),
        format!("max_concurrent_calls   {}", settings.max_concurrent_calls),
        format!("request_timeout        {} s", settings.request_timeout_secs),
        format!(
            "retries                {} attempts, {} ms base delay",
            settings.retry_max_attempts, settings.retry_base_delay_ms
        ),
        format!("network_poll_interval  {} s", settings.network_poll_interval_secs),
    ]
}

pub async fn run_settings(app: &App, command: SettingsCommands) -> Result<(), CliError> {
    match command {
        SettingsCommands::Show { json } => {
            let settings = app.orchestrator.settings();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                for line in format_settings_lines(&settings) {
                    println!("{line}");
                }
                println!("notes_root             {}", app.config.notes_root().display());
                println!("database               {}", app.config.database_path().display());
                println!("conflict_dir           {}", app.config.conflict_dir().display());
            }
        }
        SettingsCommands::Set {
            wifi_only,
            save_conflict_copy,
            debounce_ms,
            max_concurrent_calls,
        } => {
            let changes = SettingsChanges {
                wifi_only,
                save_conflict_copy,
                debounce_ms,
                max_concurrent_calls,
            };
            if changes.is_empty() {
                return Err(CliError::Config(
                    "Nothing to change; pass at least one setting".to_string(),
                ));
            }
            let updated = apply_settings_changes(app.orchestrator.settings(), changes);
            let saved = app.orchestrator.update_settings(updated).await?;
            for line in format_settings_lines(&saved) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use inkwell_core::auth::{CredentialStore, MemoryCredentialStore, TokenSet};
use inkwell_core::config::SyncSettings;
use inkwell_core::models::{ConflictSummary, PageOutcome, PageSyncStatus, Quota, SyncConfig};
use inkwell_core::network::{ConnectionType, NetworkStatus};
use pretty_assertions::assert_eq;

use crate::app::App;
use crate::cli::{
    AccountCommands, Cli, Commands, NoteCommands, ResolutionArg, SettingsCommands, StrategyArg,
};
use crate::commands::accounts::folder_name;
use crate::commands::common::{describe_outcome, format_bytes, format_quota};
use crate::commands::network::network_report;
use crate::commands::settings::{apply_settings_changes, SettingsChanges};
use crate::commands::watch::watch_pages;
use crate::config::AppConfig;
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

fn temp_config(dir: &tempfile::TempDir) -> AppConfig {
    AppConfig {
        version: 1,
        notes_root: Some(dir.path().join("notes")),
        database_path: Some(dir.path().join("inkwell.db")),
        conflict_dir: Some(dir.path().join("conflicts")),
        ..AppConfig::default()
    }
}

async fn open_app(config: AppConfig) -> App {
    App::open_with(
        config,
        Arc::new(MemoryCredentialStore::new()),
        NetworkStatus::offline(),
    )
    .await
    .unwrap()
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_command_parses_strategy_and_note() {
    let cli = Cli::try_parse_from([
        "inkwell",
        "sync",
        "--note",
        "n1",
        "--strategy",
        "smart-merge",
    ])
    .unwrap();
    let Commands::Sync {
        account,
        note,
        strategy,
        json,
    } = cli.command
    else {
        panic!("expected sync command");
    };
    assert_eq!(account, None);
    assert_eq!(note.as_deref(), Some("n1"));
    assert_eq!(strategy, Some(StrategyArg::SmartMerge));
    assert!(!json);
}

#[test]
fn conflict_resolution_parses_kebab_case() {
    let cli =
        Cli::try_parse_from(["inkwell", "conflicts", "resolve", "n1", "p1", "keep-both"]).unwrap();
    let Commands::Conflicts {
        command: crate::cli::ConflictCommands::Resolve { resolution, .. },
    } = cli.command
    else {
        panic!("expected conflicts resolve");
    };
    assert_eq!(resolution, ResolutionArg::KeepBoth);
}

#[test]
fn note_auto_takes_explicit_bool() {
    let cli = Cli::try_parse_from(["inkwell", "note", "auto", "n1", "false"]).unwrap();
    let Commands::Note {
        command: NoteCommands::Auto { note_id, enabled },
    } = cli.command
    else {
        panic!("expected note auto");
    };
    assert_eq!(note_id, "n1");
    assert!(!enabled);
}

#[test]
fn settings_set_accepts_partial_changes() {
    let cli = Cli::try_parse_from(["inkwell", "settings", "set", "--wifi-only", "true"]).unwrap();
    let Commands::Settings {
        command:
            SettingsCommands::Set {
                wifi_only,
                debounce_ms,
                ..
            },
    } = cli.command
    else {
        panic!("expected settings set");
    };
    assert_eq!(wifi_only, Some(true));
    assert_eq!(debounce_ms, None);
}

#[test]
fn mkdir_parses_parent_and_account() {
    let cli = Cli::try_parse_from([
        "inkwell", "accounts", "mkdir", "archive", "--parent", "/inkwell", "--account", "acct-1",
    ])
    .unwrap();
    let Commands::Accounts {
        command:
            AccountCommands::Mkdir {
                name,
                parent,
                account,
            },
    } = cli.command
    else {
        panic!("expected accounts mkdir");
    };
    assert_eq!(name, "archive");
    assert_eq!(parent.as_deref(), Some("/inkwell"));
    assert_eq!(account.as_deref(), Some("acct-1"));
}

#[test]
fn folder_names_are_single_segments() {
    assert_eq!(folder_name("  archive ").unwrap(), "archive");
    assert!(folder_name("   ").is_err());
    assert!(folder_name("a/b").is_err());
}

#[test]
fn missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from_path(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.sync, SyncSettings::default());
    assert!(config.notes_root.is_none());
}

#[test]
fn config_round_trip_normalizes_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let mut config = temp_config(&dir);
    config.sync.auto_commit_debounce_ms = 100;
    config.sync.max_concurrent_calls = 64;
    config.conflict_dir = Some(PathBuf::new());

    config.save_to_path(&path).unwrap();
    let loaded = AppConfig::load_from_path(&path).unwrap();

    assert_eq!(loaded.sync.auto_commit_debounce_ms, 2_000);
    assert_eq!(loaded.sync.max_concurrent_calls, 8);
    assert_eq!(loaded.conflict_dir, None);
    assert_eq!(loaded.notes_root, config.notes_root);
}

#[test]
fn invalid_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    let error = AppConfig::load_from_path(&path).unwrap_err();
    assert!(error.contains("Failed to parse config"));
}

#[test]
fn keyring_store_round_trips_tokens() {
    let store = KeyringCredentialStore::new();
    let tokens = TokenSet {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: 1_700_000_000,
        scope: None,
    };

    store.save_tokens("acct-keyring-test", &tokens).unwrap();
    assert_eq!(
        store.load_tokens("acct-keyring-test").unwrap(),
        Some(tokens)
    );

    store.clear_tokens("acct-keyring-test").unwrap();
    assert_eq!(store.load_tokens("acct-keyring-test").unwrap(), None);
    store.clear_tokens("acct-keyring-test").unwrap();
}

#[test]
fn settings_changes_are_clamped() {
    let updated = apply_settings_changes(
        SyncSettings::default(),
        SettingsChanges {
            wifi_only: Some(true),
            debounce_ms: Some(60_000),
            ..SettingsChanges::default()
        },
    );
    assert!(updated.wifi_only);
    assert_eq!(updated.auto_commit_debounce_ms, 5_000);
    assert_eq!(updated.max_concurrent_calls, 4);
    assert!(SettingsChanges::default().is_empty());
}

#[test]
fn wifi_only_pauses_automatic_sync_on_cellular() {
    let report = network_report(NetworkStatus::online(ConnectionType::Cellular), true);
    assert!(report.online);
    assert!(!report.automatic_sync_allowed);
    assert!(report.manual_commit_allowed);

    let offline = network_report(NetworkStatus::offline(), false);
    assert!(!offline.automatic_sync_allowed);
    assert!(!offline.manual_commit_allowed);
}

#[test]
fn byte_and_quota_formatting() {
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(
        format_quota(&Quota {
            used: 1 << 29,
            total: 1 << 30,
        }),
        "512.0 MB of 1.0 GB used (50.0%)"
    );
}

#[test]
fn conflict_outcome_names_the_resolve_command() {
    let outcome = PageOutcome::Conflict(ConflictSummary {
        note_id: "n1".to_string(),
        page_id: "p1".to_string(),
        local_mtime: 0,
        cloud_mtime: 0,
    });
    let text = describe_outcome(&outcome);
    assert!(text.contains("inkwell conflicts resolve n1 p1"));
    assert_eq!(
        describe_outcome(&PageOutcome::Skipped),
        "No changes since the last sync"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn app_without_accounts_reports_missing_account() {
    let dir = tempfile::tempdir().unwrap();
    let app = open_app(temp_config(&dir)).await;

    let error = app.resolve_account(None).await.unwrap_err();
    assert!(matches!(error, CliError::NoAccount));

    let error = app.bound_note("n1").await.unwrap_err();
    assert!(matches!(error, CliError::NoteNotBound(note) if note == "n1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reads_pages_from_notes_root() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);
    let note_dir = config.notes_root().join("n1");
    std::fs::create_dir_all(&note_dir).unwrap();
    std::fs::write(note_dir.join("p1.page"), b"hello").unwrap();

    let app = open_app(config).await;
    app.state
        .configure_note(&SyncConfig::new("n1", "acct-1", "/inkwell"))
        .await
        .unwrap();

    let config = app.bound_note("n1").await.unwrap();
    let statuses = app
        .orchestrator
        .page_statuses(&config.account_id, &config.note_id)
        .await
        .unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses.get("p1"), Some(&PageSyncStatus::NotSynced));
}

#[tokio::test(flavor = "multi_thread")]
async fn settings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir);

    let app = open_app(config.clone()).await;
    let updated = apply_settings_changes(
        app.orchestrator.settings(),
        SettingsChanges {
            wifi_only: Some(true),
            save_conflict_copy: Some(false),
            ..SettingsChanges::default()
        },
    );
    app.orchestrator.update_settings(updated).await.unwrap();
    drop(app);

    let reopened = open_app(config).await;
    let settings = reopened.orchestrator.settings();
    assert!(settings.wifi_only);
    assert!(!settings.save_conflict_copy);
    assert!(reopened.network.wifi_only());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_sync_of_bound_note_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let app = open_app(temp_config(&dir)).await;
    app.state
        .configure_note(&SyncConfig::new("n1", "acct-1", "/inkwell"))
        .await
        .unwrap();

    let error = app
        .orchestrator
        .sync_note("acct-1", "n1", None)
        .await
        .unwrap_err();
    assert!(matches!(error, inkwell_core::Error::NetworkUnavailable));
}

#[tokio::test(flavor = "multi_thread")]
async fn page_edits_under_notes_root_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("notes");
    let (_watcher, mut edits) = watch_pages(&root).unwrap();

    std::fs::create_dir_all(root.join("n1")).unwrap();
    std::fs::write(root.join("n1").join("notes.txt"), b"ignored").unwrap();
    std::fs::write(root.join("n1").join("p1.page"), b"hello").unwrap();

    let edit = tokio::time::timeout(std::time::Duration::from_secs(5), edits.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edit, ("n1".to_string(), "p1".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn edits_schedule_commits_only_for_auto_commit_notes() {
    let dir = tempfile::tempdir().unwrap();
    let app = open_app(temp_config(&dir)).await;
    let mut manual = SyncConfig::new("n1", "acct-1", "/inkwell");
    manual.auto_commit = false;
    let mut auto = SyncConfig::new("n2", "acct-1", "/inkwell");
    auto.auto_commit = true;
    app.state.configure_note(&manual).await.unwrap();
    app.state.configure_note(&auto).await.unwrap();

    assert!(!app.orchestrator.notify_local_change("n1", "p1").await.unwrap());
    assert!(app.orchestrator.notify_local_change("n2", "p1").await.unwrap());
    assert!(!app.orchestrator.notify_local_change("unbound", "p1").await.unwrap());
}

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use inkwell_core::models::{ConflictResolution, InitialSyncStrategy, ProviderKind};

#[derive(Parser)]
#[command(name = "inkwell")]
#[command(about = "Sync Inkwell note pages with OneDrive and Baidu Pan")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage connected cloud accounts
    Accounts {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Configure which notes sync and where
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Reconcile every enabled note of an account with the cloud
    Sync {
        /// Account id (default account when omitted)
        #[arg(long, value_name = "ID")]
        account: Option<String>,
        /// Only reconcile this note
        #[arg(long, value_name = "NOTE")]
        note: Option<String>,
        /// First-sync policy for notes with pages on both sides
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Commit one page to its note's account now
    Commit {
        note_id: String,
        page_id: String,
    },
    /// Show per-page sync status of a note without contacting the cloud
    Status {
        note_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Show or change sync preferences
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Probe connectivity and report whether syncing is allowed
    Network {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the foreground and print sync events until interrupted
    Watch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProviderArg {
    Onedrive,
    Baidupan,
}

impl From<ProviderArg> for ProviderKind {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Onedrive => Self::OneDrive,
            ProviderArg::Baidupan => Self::BaiduPan,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    UploadLocal,
    DownloadCloud,
    SmartMerge,
}

impl From<StrategyArg> for InitialSyncStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::UploadLocal => Self::UploadLocal,
            StrategyArg::DownloadCloud => Self::DownloadCloud,
            StrategyArg::SmartMerge => Self::SmartMerge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    KeepLocal,
    KeepCloud,
    KeepBoth,
}

impl From<ResolutionArg> for ConflictResolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::KeepLocal => Self::KeepLocal,
            ResolutionArg::KeepCloud => Self::KeepCloud,
            ResolutionArg::KeepBoth => Self::KeepBoth,
        }
    }
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Sign in to a new account in the browser
    Connect {
        #[arg(value_enum)]
        provider: ProviderArg,
    },
    /// List connected accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make an account the default for startup sync and new notes
    Default { account_id: String },
    /// Sign out and forget an account's sync state
    Disconnect { account_id: String },
    /// Sign in again to an account that needs reauthorization
    Reconnect { account_id: String },
    /// Show storage usage
    Quota {
        /// Account id (default account when omitted)
        account_id: Option<String>,
    },
    /// List a cloud folder
    Browse {
        /// Folder path (drive root when omitted)
        path: Option<String>,
        /// Account id (default account when omitted)
        #[arg(long, value_name = "ID")]
        account: Option<String>,
    },
    /// Create a cloud folder
    Mkdir {
        name: String,
        /// Parent folder path (drive root when omitted)
        #[arg(long, value_name = "PATH")]
        parent: Option<String>,
        /// Account id (default account when omitted)
        #[arg(long, value_name = "ID")]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum NoteCommands {
    /// Sync a note to an account folder
    Bind {
        note_id: String,
        /// Account id (default account when omitted)
        #[arg(long, value_name = "ID")]
        account: Option<String>,
        /// Cloud folder holding the note folders
        #[arg(long, value_name = "PATH", default_value = "/inkwell")]
        folder: String,
        /// Commit pages automatically after edits settle
        #[arg(long)]
        auto_commit: bool,
    },
    /// Stop syncing a note and forget its configuration
    Unbind { note_id: String },
    /// Turn auto-commit on or off
    Auto {
        note_id: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Resume syncing a note
    Enable { note_id: String },
    /// Pause syncing a note
    Disable { note_id: String },
    /// List configured notes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// Apply a resolution to a conflicted page
    Resolve {
        note_id: String,
        page_id: String,
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },
    /// List saved conflict copies of a note
    Copies {
        note_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the current preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change preferences; omitted values stay as they are
    Set {
        #[arg(long, value_name = "BOOL")]
        wifi_only: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        save_conflict_copy: Option<bool>,
        #[arg(long, value_name = "MS")]
        debounce_ms: Option<u64>,
        #[arg(long, value_name = "N")]
        max_concurrent_calls: Option<usize>,
    },
}

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] inkwell_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No account is connected. Run `inkwell accounts connect <provider>` first.")]
    NoAccount,
    #[error("Note {0} is not bound to a cloud account. Run `inkwell note bind {0}` first.")]
    NoteNotBound(String),
    #[error(
        "Note {0} has pages both locally and in the cloud. Re-run with --strategy upload-local, download-cloud or smart-merge."
    )]
    StrategyRequired(String),
    #[error("{0}")]
    PageFailed(String),
}

use inkwell_core::models::InitialSyncStrategy;
use inkwell_core::{Error, SyncResult};

use crate::app::App;
use crate::cli::StrategyArg;
use crate::commands::common::{describe_outcome, format_status_lines, format_sync_result_lines};
use crate::error::CliError;

pub async fn run_sync(
    app: &App,
    account: Option<&str>,
    note: Option<&str>,
    strategy: Option<StrategyArg>,
    as_json: bool,
) -> Result<(), CliError> {
    let strategy = strategy.map(InitialSyncStrategy::from);
    let result = if let Some(note_id) = note {
        let config = app.bound_note(note_id.trim()).await?;
        let account_id = account.map_or(config.account_id.as_str(), str::trim);
        sync_single_note(app, account_id, &config.note_id, strategy).await?
    } else {
        let account = app.resolve_account(account).await?;
        app.orchestrator.sync_now(&account.id, strategy).await?
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_result_lines(&result) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn sync_single_note(
    app: &App,
    account_id: &str,
    note_id: &str,
    strategy: Option<InitialSyncStrategy>,
) -> Result<SyncResult, CliError> {
    match app
        .orchestrator
        .sync_note(account_id, note_id, strategy)
        .await
    {
        Ok(result) => Ok(result),
        Err(Error::InitialStrategyRequired { note_id }) => Err(CliError::StrategyRequired(note_id)),
        Err(error) => Err(error.into()),
    }
}

pub async fn run_commit(app: &App, note_id: &str, page_id: &str) -> Result<(), CliError> {
    let config = app.bound_note(note_id.trim()).await?;
    let outcome = app
        .orchestrator
        .commit_page(&config.account_id, &config.note_id, page_id.trim())
        .await
        .map_err(|error| CliError::PageFailed(error.to_string()))?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub async fn run_status(app: &App, note_id: &str, as_json: bool) -> Result<(), CliError> {
    let config = app.bound_note(note_id.trim()).await?;
    let statuses = app
        .orchestrator
        .page_statuses(&config.account_id, &config.note_id)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else if statuses.is_empty() {
        println!("Note {} has no pages.", config.note_id);
    } else {
        for line in format_status_lines(&statuses) {
            println!("{line}");
        }
    }
    Ok(())
}

//! Inkwell CLI - drive page-level cloud sync from the terminal

mod app;
mod cli;
mod commands;
mod config;
mod credentials;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::commands::accounts::run_accounts;
use crate::commands::conflicts::run_conflicts;
use crate::commands::network::run_network;
use crate::commands::note::run_note;
use crate::commands::settings::run_settings;
use crate::commands::sync::{run_commit, run_status, run_sync};
use crate::commands::watch::run_watch;
use crate::config::{default_config_path, AppConfig};
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "inkwell=info,inkwell_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = AppConfig::load_from_path(&config_path).map_err(CliError::Config)?;
    let app = App::open(config).await?;

    match cli.command {
        Commands::Accounts { command } => run_accounts(&app, command).await?,
        Commands::Note { command } => run_note(&app, command).await?,
        Commands::Sync {
            account,
            note,
            strategy,
            json,
        } => run_sync(&app, account.as_deref(), note.as_deref(), strategy, json).await?,
        Commands::Commit { note_id, page_id } => run_commit(&app, &note_id, &page_id).await?,
        Commands::Status { note_id, json } => run_status(&app, &note_id, json).await?,
        Commands::Conflicts { command } => run_conflicts(&app, command).await?,
        Commands::Settings { command } => run_settings(&app, command).await?,
        Commands::Network { json } => run_network(&app, json)?,
        Commands::Watch => run_watch(&app).await?,
    }

    Ok(())
}

use inkwell_core::models::ProviderKind;

use crate::app::App;
use crate::cli::AccountCommands;
use crate::commands::common::{format_account_lines, format_folder_lines, format_quota};
use crate::error::CliError;

pub async fn run_accounts(app: &App, command: AccountCommands) -> Result<(), CliError> {
    match command {
        AccountCommands::Connect { provider } => {
            let kind = ProviderKind::from(provider);
            println!("Opening {} sign-in in your browser...", kind.display_name());
            let account = app.accounts.connect(kind).await?;
            println!(
                "Connected {} account {} ({})",
                kind.display_name(),
                account.display_name,
                account.id
            );
            if account.is_default {
                println!("This is now the default account.");
            }
        }
        AccountCommands::List { json } => {
            let accounts = app.accounts.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else if accounts.is_empty() {
                println!("No accounts connected.");
            } else {
                for line in format_account_lines(&accounts) {
                    println!("{line}");
                }
            }
        }
        AccountCommands::Default { account_id } => {
            app.accounts.set_default(account_id.trim()).await?;
            println!("Default account set to {}", account_id.trim());
        }
        AccountCommands::Disconnect { account_id } => {
            app.accounts.disconnect(account_id.trim()).await?;
            println!("Disconnected {}", account_id.trim());
        }
        AccountCommands::Reconnect { account_id } => {
            let account = app.accounts.reconnect(account_id.trim()).await?;
            println!("Reconnected {} ({})", account.display_name, account.id);
        }
        AccountCommands::Quota { account_id } => {
            let account = app.resolve_account(account_id.as_deref()).await?;
            let quota = app.accounts.quota(&account.id).await?;
            println!("{}: {}", account.display_name, format_quota(&quota));
        }
        AccountCommands::Browse { path, account } => {
            let account = app.resolve_account(account.as_deref()).await?;
            let items = app
                .accounts
                .list_folder(&account.id, path.as_deref())
                .await?;
            if items.is_empty() {
                println!("(empty)");
            }
            for line in format_folder_lines(&items) {
                println!("{line}");
            }
        }
        AccountCommands::Mkdir {
            name,
            parent,
            account,
        } => {
            let name = folder_name(&name)?;
            let account = app.resolve_account(account.as_deref()).await?;
            let folder = app
                .accounts
                .create_folder(&account.id, name, parent.as_deref())
                .await?;
            println!("Created {}", folder.path);
        }
    }
    Ok(())
}

/// A single path segment for a new cloud folder.
pub fn folder_name(raw: &str) -> Result<&str, CliError> {
    let name = raw.trim();
    if name.is_empty() || name.contains('/') {
        return Err(inkwell_core::Error::InvalidInput(format!(
            "Folder name {raw:?} must be one non-empty path segment"
        ))
        .into());
    }
    Ok(name)
}

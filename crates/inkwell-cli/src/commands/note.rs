use inkwell_core::models::SyncConfig;

use crate::app::App;
use crate::cli::NoteCommands;
use crate::commands::common::format_note_lines;
use crate::error::CliError;

pub async fn run_note(app: &App, command: NoteCommands) -> Result<(), CliError> {
    match command {
        NoteCommands::Bind {
            note_id,
            account,
            folder,
            auto_commit,
        } => {
            let account = app.resolve_account(account.as_deref()).await?;
            let mut config = SyncConfig::new(note_id.trim(), &account.id, folder);
            config.auto_commit = auto_commit;
            let config = app.state.configure_note(&config).await?;
            println!(
                "Note {} syncs to {} on {}",
                config.note_id,
                config.note_folder(),
                account.display_name
            );
        }
        NoteCommands::Unbind { note_id } => {
            if app.state.remove_note(note_id.trim()).await? {
                println!("Note {} no longer syncs", note_id.trim());
            } else {
                return Err(CliError::NoteNotBound(note_id.trim().to_string()));
            }
        }
        NoteCommands::Auto { note_id, enabled } => {
            let config = app.state.set_auto_commit(note_id.trim(), enabled).await?;
            let mode = if config.auto_commit { "auto" } else { "manual" };
            println!("Note {} commits in {mode} mode", config.note_id);
        }
        NoteCommands::Enable { note_id } => {
            let config = app.state.set_enabled(note_id.trim(), true).await?;
            println!("Note {} sync enabled", config.note_id);
        }
        NoteCommands::Disable { note_id } => {
            let config = app.state.set_enabled(note_id.trim(), false).await?;
            println!("Note {} sync paused", config.note_id);
        }
        NoteCommands::List { json } => {
            let configs = app.state.all_notes().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&configs)?);
            } else if configs.is_empty() {
                println!("No notes are configured to sync.");
            } else {
                for line in format_note_lines(&configs) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

use inkwell_core::models::ConflictResolution;

use crate::app::App;
use crate::cli::ConflictCommands;
use crate::commands::common::{describe_outcome, format_timestamp};
use crate::error::CliError;

pub async fn run_conflicts(app: &App, command: ConflictCommands) -> Result<(), CliError> {
    match command {
        ConflictCommands::Resolve {
            note_id,
            page_id,
            resolution,
        } => {
            let config = app.bound_note(note_id.trim()).await?;
            let outcome = app
                .orchestrator
                .resolve_conflict(
                    &config.account_id,
                    &config.note_id,
                    page_id.trim(),
                    ConflictResolution::from(resolution),
                )
                .await
                .map_err(|error| CliError::PageFailed(error.to_string()))?;
            println!("{}", describe_outcome(&outcome));
        }
        ConflictCommands::Copies { note_id, json } => {
            let copies = app.archive.list(note_id.trim()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&copies)?);
            } else if copies.is_empty() {
                println!("No conflict copies saved for {}.", note_id.trim());
            } else {
                for copy in &copies {
                    println!(
                        "{:<36}  {}  {}",
                        copy.page_id,
                        format_timestamp(copy.created_at),
                        copy.path.display()
                    );
                }
            }
        }
    }
    Ok(())
}

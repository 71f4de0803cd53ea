use std::path::Path;
use std::sync::Arc;

use inkwell_core::local::FsNoteStore;
use inkwell_core::network::SystemProbe;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::app::App;
use crate::commands::common::{describe_event, format_sync_result_lines};
use crate::error::CliError;

/// Watch `root` for page edits, reported as `(note_id, page_id)`.
///
/// Events stop when the returned watcher is dropped.
pub fn watch_pages(
    root: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<(String, String)>), CliError> {
    std::fs::create_dir_all(root)?;
    // Watchers report resolved paths on some platforms.
    let root = std::fs::canonicalize(root)?;
    let pages = FsNoteStore::new(root.clone());
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
            Ok(event) => {
                for page in event.paths.iter().filter_map(|path| pages.page_at(path)) {
                    if tx.send(page).is_err() {
                        return;
                    }
                }
            }
            Err(error) => tracing::warn!("File watcher error: {}", error),
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!("Watching {} for page edits", root.display());
    Ok((watcher, rx))
}

/// Run the startup sync, then follow connectivity and page edits, printing
/// events until Ctrl-C. Work queued while offline runs when the connection
/// comes back; edits in auto-commit notes are committed once they settle.
pub async fn run_watch(app: &App) -> Result<(), CliError> {
    let mut events = app.orchestrator.events().subscribe();
    let interval = app.orchestrator.settings().network_poll_interval();
    let poller = app
        .network
        .spawn_polling(Arc::new(SystemProbe::default()), interval);
    let (_watcher, mut edits) = watch_pages(&app.config.notes_root())?;

    match app.orchestrator.sync_default_account().await {
        Ok(Some(result)) => {
            for line in format_sync_result_lines(&result) {
                println!("{line}");
            }
        }
        Ok(None) => println!("No connected default account to sync right now."),
        Err(error) => eprintln!("Startup sync failed: {error}"),
    }
    println!("Watching for sync activity; press Ctrl-C to stop.");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            Some((note_id, page_id)) = edits.recv() => {
                match app.orchestrator.notify_local_change(&note_id, &page_id).await {
                    Ok(true) => tracing::debug!("Auto-commit scheduled for {}/{}", note_id, page_id),
                    Ok(false) => {}
                    Err(error) => tracing::warn!(
                        "Could not schedule auto-commit for {}/{}: {}",
                        note_id,
                        page_id,
                        error
                    ),
                }
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event output fell behind; skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    app.orchestrator.cancel();
    poller.abort();
    Ok(())
}

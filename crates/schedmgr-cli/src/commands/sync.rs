//! Sync subcommand for the external calendar.
//!
//! Explicit actions go through [`report`] so the outcome is printed; the
//! `watch` loop runs silent rounds and only logs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use schedmgr_core::sync::{report, run_dispatcher, Reporter, SyncSchedule};
use schedmgr_core::{AutoSync, EventStore, SyncError};

use super::{App, CliResult, Reported};

/// Sync actions for the external calendar.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Pull external events and merge them locally
    Pull,
    /// Push all eligible local events to the external calendar
    Push,
    /// Pull, then push
    Now,
    /// Collapse duplicate local events
    Dedupe,
    /// Delete every tagged event from the external calendar
    Clear {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
    /// Run automatic sync until interrupted
    Watch,
    /// Import events from an exported JSON file
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Export all local events as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show sync configuration and local store state
    Status,
}

/// Prints outcomes of explicit actions to the terminal.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn success(&self, action: &str, detail: &str) {
        println!("{action}: {detail}");
    }

    fn failure(&self, action: &str, error: &SyncError) {
        eprintln!("{action} failed: {}", error.user_message());
    }
}

/// Run the sync command.
pub async fn run(action: SyncAction) -> CliResult {
    let app = App::open()?;
    let engine = &app.engine;
    let reporter = ConsoleReporter;

    let outcome = match action {
        SyncAction::Pull => report(&reporter, "pull", engine.pull().await).map(drop),
        SyncAction::Push => report(&reporter, "push", engine.push().await).map(drop),
        SyncAction::Now => report(&reporter, "sync", engine.sync_once().await).map(drop),
        SyncAction::Dedupe => {
            let removed = engine.dedupe().await.map(|n| format!("{n} duplicates removed"));
            report(&reporter, "dedupe", removed).map(drop)
        }
        SyncAction::Clear { yes } => {
            if !yes {
                return Err("refusing to clear the external calendar without --yes".into());
            }
            let cleared = engine
                .clear_external()
                .await
                .map(|n| format!("{n} external events deleted"));
            report(&reporter, "clear", cleared).map(drop)
        }
        SyncAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let imported = engine.import(&json).await.map(|n| format!("{n} events imported"));
            report(&reporter, "import", imported).map(drop)
        }
        SyncAction::Export { output } => {
            let envelope = engine.export().await.map_err(|e| e.user_message())?;
            let json = serde_json::to_string_pretty(&envelope)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("exported {} events to {}", envelope.event_count, path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        SyncAction::Status => return show_status(&app).await,
        SyncAction::Watch => return watch(&app).await,
    };

    outcome.map_err(|_| Reported.into())
}

async fn show_status(app: &App) -> CliResult {
    let engine = &app.engine;
    let events = app.store.fetch_all().await?;
    let in_range = engine.list_events(false).await?.len();
    let status = serde_json::json!({
        "endpoint": app.config.endpoint(),
        "configured": engine.is_configured(),
        "storeConnected": engine.store_connected(),
        "autoSync": app.config.sync.enabled,
        "intervalSecs": app.config.sync.interval_secs,
        "timezone": engine.tz().name(),
        "clientId": engine.client_id().as_str(),
        "events": events.len(),
        "eventsInRange": in_range,
        "window": engine.range().window_iso(engine.tz()),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Run the automatic loop alongside a change-feed dispatcher until Ctrl-C.
async fn watch(app: &App) -> CliResult {
    if !app.config.sync.enabled {
        println!("automatic sync is disabled (sync.enabled = false)");
        return Ok(());
    }

    app.cache.lock().await.load(app.store.as_ref()).await?;
    let dispatcher = tokio::spawn(run_dispatcher(app.store.subscribe(), Arc::clone(&app.cache)));

    let Some(auto) = AutoSync::spawn(Arc::clone(&app.engine), SyncSchedule::from(&app.config.sync))
    else {
        dispatcher.abort();
        ConsoleReporter.failure("watch", &SyncError::NotConfigured);
        return Err(Reported.into());
    };

    println!("watching; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    auto.shutdown();
    dispatcher.abort();
    let status = app.engine.status();
    match status.last_report {
        Some(report) => println!("stopped; last round: {report}"),
        None => println!("stopped; no round completed"),
    }
    println!("{} events cached", app.cache.lock().await.len());
    Ok(())
}

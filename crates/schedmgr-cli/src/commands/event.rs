//! Event management commands for CLI.

use clap::Subcommand;
use schedmgr_core::{EventDraft, EventPatch, EventStore, Recurrence};

use super::{App, CliResult};

#[derive(Subcommand)]
pub enum EventAction {
    /// Create a new event and mirror it to the external calendar
    Add {
        /// Event title
        title: String,
        /// Start, e.g. "2025-06-02T09:00" or an RFC 3339 timestamp
        #[arg(long)]
        start: String,
        /// End, same formats as --start
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long)]
        all_day: bool,
        /// none, daily, weekly or monthly
        #[arg(long, default_value = "none", value_parser = parse_recurrence)]
        recurrence: Recurrence,
        #[arg(long)]
        recurrence_end: Option<String>,
        /// Minutes before start
        #[arg(long)]
        reminder: Option<u32>,
        /// Hex color (default: #3b82f6)
        #[arg(long)]
        color: Option<String>,
        /// Part of a recurring timetable; never mirrored
        #[arg(long)]
        timetable: bool,
    },
    /// List events inside the retention window
    List {
        /// Include events outside the window
        #[arg(long)]
        all: bool,
    },
    /// Get event details
    Get {
        /// Event ID
        id: String,
    },
    /// Update an event
    Update {
        /// Event ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        all_day: Option<bool>,
        #[arg(long, value_parser = parse_recurrence)]
        recurrence: Option<Recurrence>,
        #[arg(long)]
        reminder: Option<u32>,
        /// Remove the reminder
        #[arg(long, conflicts_with = "reminder")]
        no_reminder: bool,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete an event
    Delete {
        /// Event ID
        id: String,
    },
}

fn parse_recurrence(value: &str) -> Result<Recurrence, String> {
    match value.trim().to_lowercase().as_str() {
        "none" => Ok(Recurrence::None),
        "daily" => Ok(Recurrence::Daily),
        "weekly" => Ok(Recurrence::Weekly),
        "monthly" => Ok(Recurrence::Monthly),
        other => Err(format!(
            "unknown recurrence '{other}' (expected none, daily, weekly or monthly)"
        )),
    }
}

pub async fn run(action: EventAction) -> CliResult {
    let app = App::open()?;
    let engine = &app.engine;

    match action {
        EventAction::Add {
            title,
            start,
            end,
            description,
            location,
            all_day,
            recurrence,
            recurrence_end,
            reminder,
            color,
            timetable,
        } => {
            let draft = EventDraft {
                description,
                location,
                all_day,
                recurrence,
                recurrence_end,
                reminder_minutes: reminder,
                color,
                is_timetable: timetable,
                ..EventDraft::new(title, start, end)
            };
            let id = engine.create_event(draft).await.map_err(|e| e.user_message())?;
            println!("Event created: {id}");
            if let Some(event) = app.store.get(&id).await? {
                println!("{}", serde_json::to_string_pretty(&event)?);
            }
        }
        EventAction::List { all } => {
            let events = engine.list_events(all).await?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        EventAction::Get { id } => match app.store.get(&id).await? {
            Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
            None => return Err(format!("event not found: {id}").into()),
        },
        EventAction::Update {
            id,
            title,
            start,
            end,
            description,
            location,
            all_day,
            recurrence,
            reminder,
            no_reminder,
            color,
        } => {
            let reminder_minutes = if no_reminder {
                Some(None)
            } else {
                reminder.map(Some)
            };
            let patch = EventPatch {
                title,
                start_time: start,
                end_time: end,
                description,
                location,
                all_day,
                recurrence,
                reminder_minutes,
                color,
                ..Default::default()
            };
            if !engine.update_event(&id, patch).await.map_err(|e| e.user_message())? {
                return Err(format!("event not found: {id}").into());
            }
            println!("Event updated: {id}");
        }
        EventAction::Delete { id } => {
            if !engine.delete_event(&id).await.map_err(|e| e.user_message())? {
                return Err(format!("event not found: {id}").into());
            }
            println!("Event deleted: {id}");
        }
    }
    Ok(())
}

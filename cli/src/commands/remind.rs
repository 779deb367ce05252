use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use serde_json::json;

use caseflow_client::ClientConfig;
use caseflow_client::reminders::{
    LogNotifier, Notifier, ReminderBook, ReminderError, ReminderScheduler,
};
use caseflow_core::reminders::{NewReminder, Reminder, ReminderPriority};

use crate::util::{
    EXIT_CLIENT, EXIT_OK, EXIT_SERVER, open_client, parse_datetime, print_error, print_json,
    print_json_line,
};

#[derive(Subcommand)]
pub enum RemindCommands {
    /// Create a reminder for a case
    Add {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        title: String,
        /// Due date (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        due: String,
        /// When to fire (RFC3339 or YYYY-MM-DD). Defaults to one day before due.
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        priority: Option<PriorityArg>,
        /// Defaults to "general"
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        /// Guidance step this reminder belongs to
        #[arg(long)]
        step_id: Option<String>,
        /// Licence or permit this reminder tracks
        #[arg(long)]
        license_id: Option<String>,
    },
    /// List reminders
    List {
        /// Only reminders of this case
        #[arg(long)]
        case_id: Option<String>,
        /// Only pending reminders whose time has come
        #[arg(long)]
        due: bool,
    },
    /// Dismiss a reminder
    Dismiss { id: String },
    /// Mark a reminder as completed
    Complete { id: String },
    /// Delete a reminder
    Delete { id: String },
    /// Scan for due reminders until interrupted, printing each as it fires
    Watch,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PriorityArg {
    High,
    Medium,
    Low,
}

impl From<PriorityArg> for ReminderPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::High => ReminderPriority::High,
            PriorityArg::Medium => ReminderPriority::Medium,
            PriorityArg::Low => ReminderPriority::Low,
        }
    }
}

/// Logs each fired reminder and prints it to stdout as one JSON line.
struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, reminder: &Reminder) {
        LogNotifier.notify(reminder);
        print_json_line(&json!({
            "event": "reminder_fired",
            "reminder": reminder,
        }));
    }
}

fn print_reminder_error(error: &ReminderError) -> i32 {
    match error {
        ReminderError::Validation { .. } | ReminderError::InvalidTransition { .. } => {
            print_error("validation_failed", &error.to_string(), None, EXIT_CLIENT)
        }
        ReminderError::Archive(_) => print_error(
            "storage_error",
            &error.to_string(),
            Some("Check that CASEFLOW_DATA_DIR is writable."),
            EXIT_SERVER,
        ),
    }
}

fn not_found(id: &str) -> i32 {
    print_error(
        "not_found",
        &format!("reminder {id} not found"),
        Some("List reminders with: caseflow remind list"),
        EXIT_CLIENT,
    )
}

pub async fn run(config: ClientConfig, command: RemindCommands) -> i32 {
    let interval = config.reminder_interval;
    let client = open_client(config);
    let book = client.reminders.clone();

    match command {
        RemindCommands::Add {
            case_id,
            title,
            due,
            at,
            priority,
            category,
            description,
            step_id,
            license_id,
        } => {
            let due_date = match parse_datetime(&due) {
                Ok(ts) => ts,
                Err(e) => return print_error("validation_failed", &e, None, EXIT_CLIENT),
            };
            let reminder_time = match at.as_deref().map(parse_datetime).transpose() {
                Ok(ts) => ts,
                Err(e) => return print_error("validation_failed", &e, None, EXIT_CLIENT),
            };
            let new = NewReminder {
                case_id,
                title,
                description,
                due_date,
                reminder_time,
                priority: priority.map(Into::into),
                category,
                step_id,
                license_id,
            };
            match book.create(new, Utc::now()) {
                Ok(reminder) => print_json(&reminder),
                Err(e) => print_reminder_error(&e),
            }
        }
        RemindCommands::List { case_id, due } => {
            let listed = match (&case_id, due) {
                (_, true) => book.due(Utc::now()),
                (Some(case_id), false) => book.for_case(case_id),
                (None, false) => book.all(),
            };
            let listed = listed.map(|reminders| {
                reminders
                    .into_iter()
                    .filter(|r| case_id.as_deref().is_none_or(|c| r.case_id == c))
                    .collect::<Vec<_>>()
            });
            match listed {
                Ok(reminders) => print_json(&reminders),
                Err(e) => print_reminder_error(&e),
            }
        }
        RemindCommands::Dismiss { id } => match book.dismiss(&id) {
            Ok(Some(reminder)) => print_json(&reminder),
            Ok(None) => not_found(&id),
            Err(e) => print_reminder_error(&e),
        },
        RemindCommands::Complete { id } => match book.complete(&id) {
            Ok(Some(reminder)) => print_json(&reminder),
            Ok(None) => not_found(&id),
            Err(e) => print_reminder_error(&e),
        },
        RemindCommands::Delete { id } => match book.delete(&id) {
            Ok(true) => print_json(&json!({ "deleted": id })),
            Ok(false) => not_found(&id),
            Err(e) => print_reminder_error(&e),
        },
        RemindCommands::Watch => watch(book, interval).await,
    }
}

async fn watch(book: Arc<ReminderBook>, interval: Duration) -> i32 {
    tracing::info!(interval_secs = interval.as_secs(), "Watching reminders");
    let handle = ReminderScheduler::spawn(book, StdoutNotifier, interval);
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl-C");
    }
    handle.shutdown().await;
    EXIT_OK
}

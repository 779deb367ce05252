use clap::Subcommand;
use serde_json::json;

use caseflow_client::ClientConfig;
use caseflow_client::api::ApiClient;

use crate::util::{
    EXIT_CLIENT, open_client, print_error, print_json, print_storage_error, print_transport_error,
};

#[derive(Subcommand)]
pub enum CaseCommands {
    /// List archived cases, most recent first
    List {
        /// List the server's in-memory directory instead of the local archive
        #[arg(long)]
        remote: bool,
        /// Maximum number of remote cases (server default 50, clamped to 1..=200)
        #[arg(long, requires = "remote")]
        limit: Option<i64>,
    },
    /// Show one case with its result, activity log, chat and reminders
    Show {
        case_id: String,
        /// Look the case up in the server directory instead
        #[arg(long)]
        remote: bool,
    },
    /// Delete a case and everything archived with it
    Delete { case_id: String },
    /// Summary counts over the local archive
    Analytics,
}

pub async fn run(config: ClientConfig, command: CaseCommands) -> i32 {
    match command {
        CaseCommands::List { remote: true, limit } => {
            match ApiClient::new(config.api_url).list_cases(limit).await {
                Ok(entries) => print_json(&entries),
                Err(e) => print_transport_error(&e),
            }
        }
        CaseCommands::List { remote: false, .. } => list_local(config),
        CaseCommands::Show {
            case_id,
            remote: true,
        } => match ApiClient::new(config.api_url).get_case(&case_id).await {
            Ok(Some(entry)) => print_json(&entry),
            Ok(None) => not_found(&case_id),
            Err(e) => print_transport_error(&e),
        },
        CaseCommands::Show {
            case_id,
            remote: false,
        } => show_local(config, &case_id),
        CaseCommands::Delete { case_id } => delete(config, &case_id),
        CaseCommands::Analytics => analytics(config),
    }
}

fn not_found(case_id: &str) -> i32 {
    print_error(
        "not_found",
        &format!("case {case_id} not found"),
        Some("List known cases with: caseflow case list"),
        EXIT_CLIENT,
    )
}

fn list_local(config: ClientConfig) -> i32 {
    let client = open_client(config);
    match client.archive.list() {
        Ok(records) => print_json(&records),
        Err(e) => print_storage_error(&e),
    }
}

fn show_local(config: ClientConfig, case_id: &str) -> i32 {
    let client = open_client(config);
    let archive = &client.archive;

    let loaded = (|| {
        Ok::<_, Box<dyn std::error::Error>>(json!({
            "record": archive.get_record(case_id)?,
            "result": archive.get_result(case_id)?,
            "events": archive.get_events(case_id)?,
            "chat": archive.get_chat(case_id)?,
            "reminders": client.reminders.for_case(case_id)?,
        }))
    })();

    match loaded {
        Ok(case) if case["record"].is_null() && case["result"].is_null() => not_found(case_id),
        Ok(case) => print_json(&case),
        Err(e) => print_storage_error(e.as_ref()),
    }
}

fn delete(config: ClientConfig, case_id: &str) -> i32 {
    let client = open_client(config);
    match client.archive.delete(case_id) {
        Ok(true) => print_json(&json!({ "deleted": case_id })),
        Ok(false) => not_found(case_id),
        Err(e) => print_storage_error(&e),
    }
}

fn analytics(config: ClientConfig) -> i32 {
    let client = open_client(config);
    match client.archive.analytics() {
        Ok(summary) => print_json(&summary),
        Err(e) => print_storage_error(&e),
    }
}

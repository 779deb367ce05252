use clap::Subcommand;
use serde_json::json;

use caseflow_client::ClientConfig;
use caseflow_client::chat::{ChatError, ChatSession};
use caseflow_client::transport::ChatTransport;

use crate::util::{
    EXIT_CLIENT, EXIT_SERVER, open_client, print_error, print_json, print_storage_error,
    print_transport_error,
};

#[derive(Subcommand)]
pub enum ChatCommands {
    /// Ask a follow-up question about a case
    Send {
        #[arg(long)]
        case_id: String,
        /// The question
        message: String,
    },
    /// Print the chat transcript of a case
    History {
        #[arg(long)]
        case_id: String,
    },
    /// Delete the chat transcript of a case
    Clear {
        #[arg(long)]
        case_id: String,
    },
}

pub async fn run(config: ClientConfig, command: ChatCommands) -> i32 {
    let client = open_client(config);

    match command {
        ChatCommands::Send { case_id, message } => {
            let session = ChatSession::open(case_id, client.archive.clone(), client.api.clone());
            warn_load_error(&session);
            let mut sent = session.send_message(&message).await;
            if matches!(sent, Err(ChatError::NotReady)) {
                // Not archived locally; the server directory may still know the case.
                if let Ok(Some(entry)) = client.api.get_case(session.case_id()).await {
                    session.attach_result(entry.result);
                    sent = session.send_message(&message).await;
                }
            }
            match sent {
                Ok(Some(reply)) => print_json(&json!({
                    "reply": reply,
                    "suggested_questions": session.suggested_questions(),
                })),
                Ok(None) => print_error(
                    "validation_failed",
                    "message is required and must not be empty",
                    None,
                    EXIT_CLIENT,
                ),
                Err(ChatError::NotReady) => print_error(
                    "not_ready",
                    &ChatError::NotReady.to_string(),
                    Some("Run the case first (caseflow run / caseflow demo) so it has a result."),
                    EXIT_CLIENT,
                ),
                Err(ChatError::Transport(e)) => {
                    // The question is already saved; a plain retry re-sends it.
                    print_transport_error(&e)
                }
                Err(e) => print_error("chat_error", &e.to_string(), None, EXIT_SERVER),
            }
        }
        ChatCommands::History { case_id } => match client.archive.get_chat(&case_id) {
            Ok(messages) => print_json(&messages),
            Err(e) => print_storage_error(&e),
        },
        ChatCommands::Clear { case_id } => {
            let session = ChatSession::open(case_id, client.archive.clone(), client.api.clone());
            match session.clear_chat() {
                Ok(()) => print_json(&json!({
                    "cleared": session.case_id(),
                    "suggested_questions": session.suggested_questions(),
                })),
                Err(e) => print_storage_error(&e),
            }
        }
    }
}

fn warn_load_error<T: ChatTransport>(session: &ChatSession<T>) {
    if let Some(err) = session.last_error() {
        tracing::warn!(case_id = %session.case_id(), error = %err, "Chat history unavailable");
    }
}

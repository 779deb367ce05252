use clap::Subcommand;

use caseflow_client::ClientConfig;
use caseflow_client::api::ApiClient;

use crate::util::{print_json, print_transport_error};

#[derive(Subcommand)]
pub enum KnowledgeCommands {
    /// Search the procedure catalog
    Search {
        /// Free-text query (e.g. "trade registration")
        query: String,
        /// Maximum number of matches (server clamps to 1..=50)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// List every known procedure
    List,
}

pub async fn run(config: ClientConfig, command: KnowledgeCommands) -> i32 {
    let api = ApiClient::new(config.api_url);
    let outcome = match command {
        KnowledgeCommands::Search { query, limit } => api.search_knowledge(&query, limit).await,
        KnowledgeCommands::List => api.knowledge().await,
    };
    match outcome {
        Ok(body) => print_json(&body),
        Err(e) => print_transport_error(&e),
    }
}

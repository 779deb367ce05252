use caseflow_client::ClientConfig;
use caseflow_client::api::ApiClient;

use crate::util::{print_json, print_transport_error};

pub async fn run(config: ClientConfig) -> i32 {
    match ApiClient::new(config.api_url).health().await {
        Ok(body) => print_json(&body),
        Err(e) => print_transport_error(&e),
    }
}

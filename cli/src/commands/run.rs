use std::time::Duration;

use caseflow_client::ClientConfig;
use caseflow_client::live::RunError;

use crate::util::{
    EXIT_CLIENT, EXIT_OK, EXIT_SERVER, open_client, print_error, print_json, print_json_line,
    print_transport_error,
};

const DEMO_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Submit a live run and print the resulting view.
pub async fn analyze(config: ClientConfig, query: &str) -> i32 {
    let client = open_client(config);

    match client.runs.analyze(query).await {
        Ok(case_id) => {
            if let Some(err) = client.runs.archive_error() {
                print_error(
                    "storage_error",
                    &format!("case {case_id} completed but was not archived: {err}"),
                    None,
                    EXIT_SERVER,
                );
            }
            print_json(&client.runs.view())
        }
        Err(RunError::EmptyQuery) => print_error(
            "validation_failed",
            "query is required and must not be empty",
            Some("Describe the task, e.g. caseflow run \"open a café in Berlin\""),
            EXIT_CLIENT,
        ),
        Err(RunError::Transport(e)) => print_transport_error(&e),
        Err(e) => print_error("run_error", &e.to_string(), None, EXIT_SERVER),
    }
}

/// Replay the scripted demo. Timed playback streams activity events as JSON
/// lines and prints the final view; `instant` prints the final view only.
pub async fn demo(config: ClientConfig, instant: bool) -> i32 {
    let client = open_client(config);

    if instant {
        client.runs.load_demo_instant();
        return print_json(&client.runs.view());
    }

    client.runs.start_demo();
    let mut ticker = tokio::time::interval(DEMO_POLL_INTERVAL);
    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.runs.reset();
                return EXIT_OK;
            }
            _ = ticker.tick() => {
                let view = client.runs.view();
                for event in view.activities.iter().skip(printed) {
                    print_json_line(event);
                }
                printed = view.activities.len();
                if !view.is_running {
                    return print_json(&view);
                }
            }
        }
    }
}

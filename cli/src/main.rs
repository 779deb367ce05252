use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caseflow_client::ClientConfig;
use caseflow_client::config::{DEFAULT_API_URL, default_data_dir};
use caseflow_client::demo::SPEED_RANGE;

mod commands;
mod util;

use commands::case::CaseCommands;
use commands::chat::ChatCommands;
use commands::knowledge::KnowledgeCommands;
use commands::remind::RemindCommands;

#[derive(Parser)]
#[command(
    name = "caseflow",
    version,
    about = "Caseflow CLI: step-by-step guidance for bureaucratic cases, archived locally"
)]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "CASEFLOW_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Directory holding the local case archive (default: platform data dir)
    #[arg(long, global = true, env = "CASEFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between reminder scans in `remind watch`
    #[arg(long, global = true, env = "CASEFLOW_REMINDER_INTERVAL_SECS", default_value_t = 60)]
    reminder_interval_secs: u64,

    /// Demo playback pace multiplier (2.0 = twice as fast)
    #[arg(long, global = true, env = "CASEFLOW_DEMO_SPEED", default_value_t = 1.0)]
    demo_speed: f64,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn demo_speed_error(&self) -> Option<String> {
        (!SPEED_RANGE.contains(&self.demo_speed)).then(|| {
            format!(
                "--demo-speed must be between {} and {}, got {}",
                SPEED_RANGE.start(),
                SPEED_RANGE.end(),
                self.demo_speed
            )
        })
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            data_dir: self.data_dir.clone().unwrap_or_else(default_data_dir),
            reminder_interval: Duration::from_secs(self.reminder_interval_secs.max(1)),
            demo_speed: self.demo_speed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Submit a query for a live run and archive the result
    Run {
        /// What you want to get done (e.g. "open a café with outdoor seating in Berlin")
        query: String,
    },
    /// Replay the scripted demo case
    Demo {
        /// Load the finished demo immediately instead of playing it back
        #[arg(long)]
        instant: bool,
    },
    /// Archived case operations
    Case {
        #[command(subcommand)]
        command: CaseCommands,
    },
    /// Chat about a case's result
    Chat {
        #[command(subcommand)]
        command: ChatCommands,
    },
    /// Reminder operations
    Remind {
        #[command(subcommand)]
        command: RemindCommands,
    },
    /// Procedure catalog lookup
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Human-readable logs on stderr; stdout carries JSON output only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseflow_client=warn,caseflow_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Some(message) = cli.demo_speed_error() {
        util::exit_error(
            &message,
            Some("Use 1.0 for real-time playback, 2.0 for twice as fast."),
        );
    }
    let config = cli.client_config();

    let code = match cli.command {
        Commands::Health => commands::health::run(config).await,
        Commands::Run { query } => commands::run::analyze(config, &query).await,
        Commands::Demo { instant } => commands::run::demo(config, instant).await,
        Commands::Case { command } => commands::case::run(config, command).await,
        Commands::Chat { command } => commands::chat::run(config, command).await,
        Commands::Remind { command } => commands::remind::run(config, command).await,
        Commands::Knowledge { command } => commands::knowledge::run(config, command).await,
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_build_client_config() {
        let cli = Cli::try_parse_from([
            "caseflow",
            "--api-url",
            "http://api.test",
            "--data-dir",
            "/tmp/caseflow-test",
            "--reminder-interval-secs",
            "0",
            "demo",
            "--instant",
        ])
        .expect("arguments should parse");

        let config = cli.client_config();
        assert_eq!(config.api_url, "http://api.test");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/caseflow-test"));
        assert_eq!(config.reminder_interval, Duration::from_secs(1));
        assert!(matches!(cli.command, Commands::Demo { instant: true }));
        assert!(cli.demo_speed_error().is_none());
    }

    #[test]
    fn demo_speed_outside_range_is_rejected() {
        for speed in ["1e-300", "0", "1000", "NaN"] {
            let cli = Cli::try_parse_from(["caseflow", "--demo-speed", speed, "demo"])
                .expect("arguments should parse");
            assert!(cli.demo_speed_error().is_some(), "speed {speed} accepted");
        }
        let cli = Cli::try_parse_from(["caseflow", "--demo-speed", "2.5", "demo"])
            .expect("arguments should parse");
        assert!(cli.demo_speed_error().is_none());
    }
}

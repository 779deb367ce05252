use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use caseflow_core::demo::DemoScript;

use crate::api::ApiClient;
use crate::archive::CaseArchive;
use crate::demo::DemoReplay;
use crate::live::LiveRun;
use crate::merger::RunStateMerger;
use crate::reminders::{DEFAULT_SCAN_INTERVAL, ReminderBook};
use crate::store::{FileStore, StoreError};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Where the client talks to and where it keeps its data.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub reminder_interval: Duration,
    /// Demo playback pace multiplier
    pub demo_speed: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: default_data_dir(),
            reminder_interval: DEFAULT_SCAN_INTERVAL,
            demo_speed: 1.0,
        }
    }
}

/// `<platform data dir>/caseflow`, or `./.caseflow` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("caseflow"))
        .unwrap_or_else(|| PathBuf::from(".caseflow"))
}

/// Every client component, wired over one archive.
pub struct Client {
    pub api: Arc<ApiClient>,
    pub archive: Arc<CaseArchive>,
    pub runs: RunStateMerger<ApiClient>,
    pub reminders: Arc<ReminderBook>,
    pub config: ClientConfig,
}

impl Client {
    pub fn open(config: ClientConfig) -> Result<Self, StoreError> {
        let store = FileStore::open(&config.data_dir)?;
        let archive = Arc::new(CaseArchive::new(Arc::new(store)));
        let api = Arc::new(ApiClient::new(config.api_url.clone()));

        let runs = RunStateMerger::new(
            LiveRun::new(api.clone(), archive.clone()),
            DemoReplay::new(archive.clone(), DemoScript::standard()).with_speed(config.demo_speed),
        );
        let reminders = Arc::new(ReminderBook::new(archive.clone()));

        tracing::debug!(
            api_url = %config.api_url,
            data_dir = %config.data_dir.display(),
            "Client opened"
        );

        Ok(Self {
            api,
            archive,
            runs,
            reminders,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.reminder_interval, Duration::from_secs(60));
        assert!(config.data_dir.ends_with("caseflow") || config.data_dir.ends_with(".caseflow"));
    }

    #[test]
    fn open_creates_data_dir_and_shares_archive() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let config = ClientConfig {
            data_dir: dir.path().join("nested").join("data"),
            ..ClientConfig::default()
        };

        let client = Client::open(config.clone()).expect("client should open");
        assert!(config.data_dir.is_dir());

        let case_id = client.runs.load_demo_instant();
        assert!(client.archive.get_result(&case_id).expect("read").is_some());

        let reopened = Client::open(config).expect("client should reopen");
        assert_eq!(reopened.archive.list().expect("list").len(), 1);
    }
}

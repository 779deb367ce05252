//! Live run driver: submits a query to the backend and archives the outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use caseflow_core::cases::{CaseRecord, RunStatus, SubmitRunRequest, SubmitRunResponse};
use caseflow_core::run::{AgentState, AgentStatus, RunState};

use crate::archive::{ArchiveError, CaseArchive};
use crate::transport::{RunTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("query is required and must not be empty")]
    EmptyQuery,
    #[error("a live run is already in progress")]
    AlreadyRunning,
    #[error("the run was reset before the backend answered")]
    Superseded,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Default)]
struct LiveState {
    state: RunState,
    generation: u64,
    archive_error: Option<String>,
}

pub struct LiveRun<T> {
    transport: Arc<T>,
    archive: Arc<CaseArchive>,
    inner: Mutex<LiveState>,
}

impl<T: RunTransport> LiveRun<T> {
    pub fn new(transport: Arc<T>, archive: Arc<CaseArchive>) -> Self {
        Self {
            transport,
            archive,
            inner: Mutex::new(LiveState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> RunState {
        self.lock().state.clone()
    }

    pub fn archive_error(&self) -> Option<String> {
        self.lock().archive_error.clone()
    }

    /// Clear the live state. A submission still in flight is discarded when
    /// its response arrives.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = RunState::default();
        inner.archive_error = None;
    }

    /// Submit `query` and wait for the finished run. Returns the case id the
    /// backend assigned.
    pub async fn analyze(&self, query: &str) -> Result<String, RunError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RunError::EmptyQuery);
        }

        let started_at = Utc::now();
        let generation = {
            let mut inner = self.lock();
            if inner.state.status == RunStatus::Running {
                return Err(RunError::AlreadyRunning);
            }
            inner.state = RunState::started(query, None);
            inner.archive_error = None;
            inner.generation
        };

        let outcome = self
            .transport
            .submit_run(SubmitRunRequest {
                query: query.to_string(),
            })
            .await;

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("Live run response discarded after reset");
            return Err(RunError::Superseded);
        }

        match outcome {
            Ok(response) => {
                let case_id = response.case_id.clone();
                if let Err(e) = self.archive_run(&response) {
                    tracing::warn!(case_id = %case_id, error = %e, "Live run not archived");
                    inner.archive_error = Some(e.to_string());
                }
                inner.state = completed_state(response);
                tracing::info!(case_id = %case_id, "Live run completed");
                Ok(case_id)
            }
            Err(e) => {
                // The backend never assigned an id, so the failure is kept
                // under a local one.
                let case_id = format!("local-{}", Uuid::now_v7());
                tracing::warn!(case_id = %case_id, error = %e, "Live run failed");
                if let Err(ae) = self.archive_failure(&case_id, query, started_at) {
                    tracing::warn!(case_id = %case_id, error = %ae, "Failed run not archived");
                    inner.archive_error = Some(ae.to_string());
                }
                inner.state.status = RunStatus::Failed;
                inner.state.case_id = Some(case_id);
                inner.state.error = Some(e.to_string());
                Err(RunError::Transport(e))
            }
        }
    }

    fn archive_run(&self, response: &SubmitRunResponse) -> Result<(), ArchiveError> {
        self.archive.upsert_record(&CaseRecord {
            id: response.case_id.clone(),
            created_at: response.created_at,
            query: response.query.clone(),
            status: RunStatus::Completed,
        })?;
        self.archive.save_events(&response.case_id, &response.events)?;
        self.archive.save_result(&response.case_id, &response.result)
    }

    fn archive_failure(
        &self,
        case_id: &str,
        query: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), ArchiveError> {
        self.archive.upsert_record(&CaseRecord {
            id: case_id.to_string(),
            created_at,
            query: query.to_string(),
            status: RunStatus::Failed,
        })
    }
}

/// Agents are only known through the events they emitted.
fn completed_state(response: SubmitRunResponse) -> RunState {
    let mut agents: Vec<AgentState> = Vec::new();
    for event in &response.events {
        if !agents.iter().any(|a| a.id == event.agent) {
            agents.push(AgentState {
                id: event.agent.clone(),
                name: event.agent.clone(),
                role: String::new(),
                status: AgentStatus::Done,
            });
        }
    }

    RunState {
        status: RunStatus::Completed,
        case_id: Some(response.case_id),
        query: Some(response.query),
        agents,
        activities: response.events,
        result: Some(response.result),
        ..RunState::default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::future::Future;

    use caseflow_core::demo::DemoScript;
    use tokio::sync::Notify;

    use super::*;
    use crate::store::MemoryStore;

    /// Answers with the demo result under a fixed case id, or fails when
    /// `fail` is set. Optionally waits on `gate` before answering.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub fail: bool,
        pub gate: Option<Notify>,
    }

    impl RunTransport for FakeBackend {
        fn submit_run(
            &self,
            request: SubmitRunRequest,
        ) -> impl Future<Output = Result<SubmitRunResponse, TransportError>> + Send {
            async move {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.fail {
                    return Err(TransportError::Rejected {
                        status: 502,
                        code: "upstream_failed".to_string(),
                        message: "pipeline unavailable".to_string(),
                    });
                }
                let script = DemoScript::standard();
                Ok(SubmitRunResponse {
                    case_id: "live-1".to_string(),
                    created_at: Utc::now(),
                    query: request.query,
                    result: script.final_result().cloned().unwrap_or_default(),
                    events: script.events(),
                })
            }
        }
    }

    fn driver(backend: FakeBackend) -> (Arc<CaseArchive>, Arc<LiveRun<FakeBackend>>) {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let live = Arc::new(LiveRun::new(Arc::new(backend), archive.clone()));
        (archive, live)
    }

    #[tokio::test]
    async fn blank_query_is_rejected_without_side_effects() {
        let (archive, live) = driver(FakeBackend::default());
        assert!(matches!(live.analyze("  ").await, Err(RunError::EmptyQuery)));
        assert_eq!(live.state(), RunState::default());
        assert!(archive.list().expect("list").is_empty());
    }

    #[tokio::test]
    async fn successful_run_completes_and_archives() {
        let (archive, live) = driver(FakeBackend::default());
        let case_id = live.analyze(" open a café ").await.expect("run should succeed");
        assert_eq!(case_id, "live-1");

        let state = live.state();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.query.as_deref(), Some("open a café"));
        assert_eq!(state.activities.len(), DemoScript::standard().events().len());
        assert!(!state.agents.is_empty());

        let record = archive.get_record("live-1").expect("read").expect("record stored");
        assert_eq!(record.status, RunStatus::Completed);
        assert!(archive.get_result("live-1").expect("read").is_some());
        assert_eq!(archive.get_events("live-1").expect("read"), state.activities);
    }

    #[tokio::test]
    async fn failed_run_surfaces_error_state() {
        let (archive, live) = driver(FakeBackend {
            fail: true,
            gate: None,
        });
        let err = live.analyze("open a café").await.expect_err("run should fail");
        assert!(matches!(err, RunError::Transport(_)));

        let state = live.state();
        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.error.is_some_and(|e| e.contains("pipeline unavailable")));

        let listed = archive.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, RunStatus::Failed);
        assert_eq!(listed[0].query, "open a café");
        assert_eq!(state.case_id.as_deref(), Some(listed[0].id.as_str()));
        assert!(listed[0].id.starts_with("local-"));
        assert!(archive.get_result(&listed[0].id).expect("read").is_none());
    }

    #[tokio::test]
    async fn reset_during_submission_discards_late_response() {
        let (archive, live) = driver(FakeBackend {
            fail: false,
            gate: Some(Notify::new()),
        });

        let pending = {
            let live = live.clone();
            tokio::spawn(async move { live.analyze("open a café").await })
        };
        while live.state().status != RunStatus::Running {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            live.analyze("second").await,
            Err(RunError::AlreadyRunning)
        ));

        live.reset();
        live.transport
            .gate
            .as_ref()
            .expect("gate configured")
            .notify_one();

        let outcome = pending.await.expect("task should join");
        assert!(matches!(outcome, Err(RunError::Superseded)));
        assert_eq!(live.state(), RunState::default());
        assert!(archive.list().expect("list").is_empty());
    }
}

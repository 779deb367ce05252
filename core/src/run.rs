use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cases::{
    ActivityEvent, CostItem, DocumentItem, GuidanceStep, RiskItem, RunResult, RunStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Done,
    Error,
}

/// One stage of the multi-agent pipeline as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
}

/// A line of the agents' deliberation, shown alongside the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateMessage {
    pub id: String,
    pub agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// State kept by a single run producer (live driver or demo replay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub case_id: Option<String>,
    pub query: Option<String>,
    pub agents: Vec<AgentState>,
    pub activities: Vec<ActivityEvent>,
    pub result: Option<RunResult>,
    pub error: Option<String>,
    pub debate: Vec<DebateMessage>,
    /// Agent currently "typing" in the debate, if any
    pub typing: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            case_id: None,
            query: None,
            agents: Vec::new(),
            activities: Vec::new(),
            result: None,
            error: None,
            debate: Vec::new(),
            typing: None,
        }
    }
}

impl RunState {
    /// Fresh running state for `query`; everything from a previous run is dropped.
    pub fn started(query: impl Into<String>, case_id: Option<String>) -> Self {
        Self {
            status: RunStatus::Running,
            case_id,
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn set_agent_status(&mut self, agent_id: &str, status: AgentStatus) {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == agent_id) {
            agent.status = status;
        }
    }
}

/// Read-only projection of whichever producer is active. Derived on demand,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunView {
    pub status: RunStatus,
    pub case_id: Option<String>,
    pub query: Option<String>,
    pub agents: Vec<AgentState>,
    pub activities: Vec<ActivityEvent>,
    pub result: Option<RunResult>,
    pub error: Option<String>,
    pub steps: Vec<GuidanceStep>,
    pub costs: Vec<CostItem>,
    pub risks: Vec<RiskItem>,
    pub documents: Vec<DocumentItem>,
    pub debate: Vec<DebateMessage>,
    pub typing: Option<String>,
    pub is_running: bool,
    pub is_complete: bool,
    pub has_error: bool,
    pub is_demo_mode: bool,
}

impl RunView {
    pub fn project(state: &RunState, is_demo_mode: bool) -> Self {
        let result = state.result.clone();
        let (steps, costs, risks, documents) = match &result {
            Some(r) => (
                r.steps.clone(),
                r.costs.clone(),
                r.risks.clone(),
                r.documents.clone(),
            ),
            None => Default::default(),
        };

        Self {
            status: state.status,
            case_id: state.case_id.clone(),
            query: state.query.clone(),
            agents: state.agents.clone(),
            activities: state.activities.clone(),
            result,
            error: state.error.clone(),
            steps,
            costs,
            risks,
            documents,
            debate: state.debate.clone(),
            typing: state.typing.clone(),
            is_running: state.status == RunStatus::Running,
            is_complete: state.status == RunStatus::Completed,
            has_error: state.error.is_some(),
            is_demo_mode,
        }
    }
}

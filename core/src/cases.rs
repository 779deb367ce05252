use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a run, shared by case records and live/demo run state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// One user query and the identity it is archived under.
/// Archived for every run, completed or failed; only the producer that ran it
/// mutates `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CaseRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub status: RunStatus,
}

/// Structured guidance produced by the reasoning pipeline (or the demo script).
/// Immutable once stored against a case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct RunResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub steps: Vec<GuidanceStep>,
    #[serde(default)]
    pub costs: Vec<CostItem>,
    #[serde(default)]
    pub risks: Vec<RiskItem>,
    #[serde(default)]
    pub documents: Vec<DocumentItem>,
}

impl RunResult {
    pub fn total_cost(&self) -> f64 {
        self.costs.iter().map(|c| c.amount).sum()
    }

    /// True when the payload carries no guidance at all (e.g. `{}` on the wire).
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty()
            && self.steps.is_empty()
            && self.costs.is_empty()
            && self.risks.is_empty()
            && self.documents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GuidanceStep {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Office or authority the step is filed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_days: Option<u32>,
    /// Step ids that must be finished first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CostItem {
    pub label: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RiskItem {
    pub title: String,
    pub severity: Severity,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DocumentItem {
    pub name: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Risk,
}

/// Append-only activity log entry. Order of insertion is the order of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActivityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the agent that emitted the event
    pub agent: String,
    pub title: String,
    pub detail: String,
    pub severity: Severity,
}

/// Request to launch a run for a new case
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitRunRequest {
    pub query: String,
}

/// Outcome of a run submission: the directory identity plus the pipeline output
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitRunResponse {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub result: RunResult,
    /// Activity emitted by the pipeline, in order
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
}

/// A case as held by the server-side directory
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DirectoryEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub query: String,
    pub result: RunResult,
}

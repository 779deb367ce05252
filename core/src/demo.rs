//! The scripted demo run.
//!
//! Every id and timestamp in the script is derived from fixed offsets, so any
//! two replays produce byte-identical events and results. Only the wall-clock
//! pacing between frames differs.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cases::{
    ActivityEvent, CostItem, DocumentItem, GuidanceStep, RiskItem, RunResult, Severity,
};
use crate::run::{AgentState, AgentStatus, DebateMessage};

pub const DEMO_CASE_ID: &str = "demo-cafe-berlin";
pub const DEMO_QUERY: &str =
    "I want to open a small café with outdoor seating in Berlin. What do I need to do?";

/// 2025-03-03T09:00:00Z
const DEMO_BASE_EPOCH_SECS: i64 = 1_740_992_400;

#[derive(Debug, Clone, PartialEq)]
pub enum DemoAction {
    AgentStatus { agent: String, status: AgentStatus },
    Activity(ActivityEvent),
    Debate(DebateMessage),
    Typing(Option<String>),
    Complete(RunResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoFrame {
    /// Pause before this frame is applied
    pub delay: Duration,
    pub action: DemoAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoScript {
    pub case_id: String,
    pub query: String,
    pub agents: Vec<AgentState>,
    pub frames: Vec<DemoFrame>,
}

impl DemoScript {
    pub fn total_duration(&self) -> Duration {
        self.frames.iter().map(|f| f.delay).sum()
    }

    /// Activity events in the order the script emits them.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.frames
            .iter()
            .filter_map(|f| match &f.action {
                DemoAction::Activity(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn final_result(&self) -> Option<&RunResult> {
        self.frames.iter().rev().find_map(|f| match &f.action {
            DemoAction::Complete(result) => Some(result),
            _ => None,
        })
    }

    /// The café-licensing walkthrough shipped with the product.
    pub fn standard() -> Self {
        let mut b = ScriptBuilder::default();

        b.agent("intake", 400, AgentStatus::Working);
        b.activity(
            "intake",
            600,
            "Query received",
            "Food service business, outdoor seating, Berlin (Friedrichshain-Kreuzberg)",
            Severity::Info,
        );
        b.typing(Some("intake"), 300);
        b.debate(
            "intake",
            900,
            "This combines a trade registration, a food hygiene clearance \
             and a street-use permit for the terrace.",
        );
        b.typing(None, 0);
        b.agent("intake", 200, AgentStatus::Done);

        b.agent("regulations", 400, AgentStatus::Working);
        b.activity(
            "regulations",
            1200,
            "Gewerbeanmeldung required",
            "Every commercial activity must be registered with the district trade office",
            Severity::Info,
        );
        b.activity(
            "regulations",
            900,
            "Gaststättenerlaubnis check",
            "Serving alcohol triggers a restaurant licence; coffee-only service does not",
            Severity::Warning,
        );
        b.typing(Some("regulations"), 300);
        b.debate(
            "regulations",
            800,
            "Terrace seating on the pavement is a Sondernutzung of public land \
             and needs its own permit.",
        );
        b.typing(None, 0);
        b.agent("regulations", 200, AgentStatus::Done);

        b.agent("planner", 400, AgentStatus::Working);
        b.activity(
            "planner",
            1000,
            "Dependency order resolved",
            "Hygiene instruction and trade registration can run in parallel; \
             the terrace permit waits for registration",
            Severity::Info,
        );
        b.typing(Some("risk"), 300);
        b.debate(
            "risk",
            700,
            "Street-use permits in this district currently take six to eight weeks. \
             That is the critical path.",
        );
        b.typing(None, 0);
        b.agent("planner", 200, AgentStatus::Done);

        b.agent("costs", 300, AgentStatus::Working);
        b.activity(
            "costs",
            800,
            "Fees estimated",
            "Official fees total roughly 600 EUR before the terrace surface charge",
            Severity::Info,
        );
        b.agent("costs", 200, AgentStatus::Done);

        b.agent("risk", 300, AgentStatus::Working);
        b.activity(
            "risk",
            900,
            "Opening-date risk",
            "Opening before the terrace permit is granted risks fines of up to 10,000 EUR",
            Severity::Risk,
        );
        b.agent("risk", 200, AgentStatus::Done);

        b.complete(600, cafe_result());

        DemoScript {
            case_id: DEMO_CASE_ID.to_string(),
            query: DEMO_QUERY.to_string(),
            agents: demo_agents(),
            frames: b.frames,
        }
    }
}

fn demo_agents() -> Vec<AgentState> {
    [
        ("intake", "Intake Analyst", "Classifies the request"),
        ("regulations", "Regulation Researcher", "Finds the applicable rules"),
        ("planner", "Process Planner", "Orders the steps"),
        ("costs", "Cost Estimator", "Totals official fees"),
        ("risk", "Risk Auditor", "Flags delays and penalties"),
    ]
    .into_iter()
    .map(|(id, name, role)| AgentState {
        id: id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        status: AgentStatus::Idle,
    })
    .collect()
}

fn step(
    id: &str,
    title: &str,
    description: &str,
    authority: &str,
    days: u32,
    deps: &[&str],
) -> GuidanceStep {
    GuidanceStep {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        authority: Some(authority.to_string()),
        estimated_days: Some(days),
        depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
    }
}

fn cost(label: &str, amount: f64, step_id: &str) -> CostItem {
    CostItem {
        label: label.to_string(),
        amount,
        currency: "EUR".to_string(),
        step_id: Some(step_id.to_string()),
    }
}

fn cafe_result() -> RunResult {
    RunResult {
        summary: "Register the business, complete the hygiene instruction, \
                  then apply for the terrace permit. Expect eight to ten weeks end to end."
            .to_string(),
        steps: vec![
            step(
                "register",
                "Register the trade (Gewerbeanmeldung)",
                "File the trade registration online or at the district office",
                "Bezirksamt Friedrichshain-Kreuzberg, Gewerbeamt",
                3,
                &[],
            ),
            step(
                "hygiene",
                "Hygiene instruction (Belehrung nach §43 IfSG)",
                "Every person handling food needs the health office instruction certificate",
                "Gesundheitsamt",
                7,
                &[],
            ),
            step(
                "terrace",
                "Street-use permit for outdoor seating",
                "Apply for Sondernutzungserlaubnis with a seating plan",
                "Straßen- und Grünflächenamt",
                49,
                &["register"],
            ),
            step(
                "tax",
                "Tax registration",
                "Submit the Fragebogen zur steuerlichen Erfassung via ELSTER",
                "Finanzamt",
                14,
                &["register"],
            ),
        ],
        costs: vec![
            cost("Trade registration fee", 26.0, "register"),
            cost("Hygiene instruction", 45.0, "hygiene"),
            cost("Street-use permit processing", 520.0, "terrace"),
        ],
        risks: vec![
            RiskItem {
                title: "Terrace permit backlog".to_string(),
                severity: Severity::Risk,
                mitigation: "Apply the same week the trade registration is confirmed".to_string(),
            },
            RiskItem {
                title: "Alcohol changes the licence class".to_string(),
                severity: Severity::Warning,
                mitigation: "Decide on the drinks menu before filing".to_string(),
            },
        ],
        documents: vec![
            DocumentItem {
                name: "Passport or ID card".to_string(),
                required: true,
                notes: None,
            },
            DocumentItem {
                name: "Lease agreement for the premises".to_string(),
                required: true,
                notes: None,
            },
            DocumentItem {
                name: "Seating plan with pavement measurements".to_string(),
                required: true,
                notes: Some("Scale 1:100".to_string()),
            },
            DocumentItem {
                name: "Liability insurance certificate".to_string(),
                required: false,
                notes: Some("Often requested with the terrace application".to_string()),
            },
        ],
    }
}

#[derive(Default)]
struct ScriptBuilder {
    frames: Vec<DemoFrame>,
    elapsed_ms: u64,
    events: usize,
    debate: usize,
}

impl ScriptBuilder {
    fn push(&mut self, delay_ms: u64, action: DemoAction) {
        self.elapsed_ms += delay_ms;
        self.frames.push(DemoFrame {
            delay: Duration::from_millis(delay_ms),
            action,
        });
    }

    fn at(&self, delay_ms: u64) -> DateTime<Utc> {
        let offset = (self.elapsed_ms + delay_ms) as i64;
        DateTime::<Utc>::UNIX_EPOCH
            + chrono::Duration::seconds(DEMO_BASE_EPOCH_SECS)
            + chrono::Duration::milliseconds(offset)
    }

    fn agent(&mut self, agent: &str, delay_ms: u64, status: AgentStatus) {
        self.push(
            delay_ms,
            DemoAction::AgentStatus {
                agent: agent.to_string(),
                status,
            },
        );
    }

    fn activity(
        &mut self,
        agent: &str,
        delay_ms: u64,
        title: &str,
        detail: &str,
        severity: Severity,
    ) {
        self.events += 1;
        let event = ActivityEvent {
            id: format!("demo-evt-{:02}", self.events),
            timestamp: self.at(delay_ms),
            agent: agent.to_string(),
            title: title.to_string(),
            detail: detail.to_string(),
            severity,
        };
        self.push(delay_ms, DemoAction::Activity(event));
    }

    fn debate(&mut self, agent: &str, delay_ms: u64, content: &str) {
        self.debate += 1;
        let message = DebateMessage {
            id: format!("demo-msg-{:02}", self.debate),
            agent: agent.to_string(),
            content: content.to_string(),
            timestamp: self.at(delay_ms),
        };
        self.push(delay_ms, DemoAction::Debate(message));
    }

    fn typing(&mut self, agent: Option<&str>, delay_ms: u64) {
        self.push(delay_ms, DemoAction::Typing(agent.map(str::to_string)));
    }

    fn complete(&mut self, delay_ms: u64, result: RunResult) {
        self.push(delay_ms, DemoAction::Complete(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_script_is_deterministic() {
        assert_eq!(DemoScript::standard(), DemoScript::standard());
    }

    #[test]
    fn script_ends_with_completion() {
        let script = DemoScript::standard();
        assert!(matches!(
            script.frames.last().map(|f| &f.action),
            Some(DemoAction::Complete(_))
        ));
        assert_eq!(script.final_result().map(|r| r.steps.len()), Some(4));
    }

    #[test]
    fn event_ids_and_timestamps_are_ordered() {
        let events = DemoScript::standard().events();
        assert_eq!(events.len(), 6);
        assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(events[0].id, "demo-evt-01");
    }

    #[test]
    fn every_scripted_agent_is_declared() {
        let script = DemoScript::standard();
        for frame in &script.frames {
            if let DemoAction::AgentStatus { agent, .. } = &frame.action {
                assert!(script.agents.iter().any(|a| &a.id == agent), "{agent}");
            }
        }
    }
}

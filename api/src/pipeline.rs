//! Boundary to the reasoning pipeline and the chat responder.
//!
//! The multi-agent pipeline is an external collaborator; the server only needs
//! its structured result and the activity it emitted. `ScriptedPipeline` and
//! `GroundedResponder` stand in when no reasoning backend is wired up.

use std::future::Future;
use std::pin::Pin;

use caseflow_core::cases::{ActivityEvent, RunResult, Severity};
use caseflow_core::chat::{ChatMessage, ChatRequest, ChatResponse};
use caseflow_core::demo::DemoScript;
use chrono::Utc;
use uuid::Uuid;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("reasoning pipeline returned an unusable result: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: RunResult,
    pub events: Vec<ActivityEvent>,
}

pub trait RunPipeline: Send + Sync {
    fn run<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<PipelineOutput, PipelineError>>;
}

pub trait ChatResponder: Send + Sync {
    fn respond<'a>(
        &'a self,
        request: &'a ChatRequest,
        result: &'a RunResult,
    ) -> BoxFuture<'a, Result<ChatResponse, PipelineError>>;
}

/// Answers every query with the scripted walkthrough, re-stamped for this run.
#[derive(Debug, Default)]
pub struct ScriptedPipeline;

impl RunPipeline for ScriptedPipeline {
    fn run<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<PipelineOutput, PipelineError>> {
        Box::pin(async move {
            let script = DemoScript::standard();
            let result = script
                .final_result()
                .cloned()
                .ok_or_else(|| PipelineError::InvalidOutput("script has no result".to_string()))?;

            let now = Utc::now();
            let mut events = vec![ActivityEvent {
                id: Uuid::now_v7().to_string(),
                timestamp: now,
                agent: "intake".to_string(),
                title: "Query received".to_string(),
                detail: query.to_string(),
                severity: Severity::Info,
            }];
            events.extend(script.events().into_iter().skip(1).map(|event| ActivityEvent {
                id: Uuid::now_v7().to_string(),
                timestamp: now,
                ..event
            }));

            Ok(PipelineOutput { result, events })
        })
    }
}

/// Answers chat turns from the run result carried with the request.
#[derive(Debug, Default)]
pub struct GroundedResponder;

impl ChatResponder for GroundedResponder {
    fn respond<'a>(
        &'a self,
        request: &'a ChatRequest,
        result: &'a RunResult,
    ) -> BoxFuture<'a, Result<ChatResponse, PipelineError>> {
        Box::pin(async move {
            let content = answer(&request.message, result);
            Ok(ChatResponse {
                message: ChatMessage::assistant(content, Utc::now()),
                suggested_questions: Some(follow_ups(request, result)),
            })
        })
    }
}

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn answer(message: &str, result: &RunResult) -> String {
    let lower = message.to_lowercase();

    if mentions(&lower, &["cost", "fee", "price", "pay", "expensive"]) {
        if result.costs.is_empty() {
            return "No official fees were identified for this case.".to_string();
        }
        let lines: Vec<String> = result
            .costs
            .iter()
            .map(|c| format!("- {}: {:.2} {}", c.label, c.amount, c.currency))
            .collect();
        let currency = result.costs[0].currency.as_str();
        return format!(
            "Estimated official fees:\n{}\nTotal: {:.2} {currency}",
            lines.join("\n"),
            result.total_cost()
        );
    }

    if mentions(&lower, &["document", "paper", "bring", "certificate"]) {
        if result.documents.is_empty() {
            return "No specific documents were listed for this case.".to_string();
        }
        let lines: Vec<String> = result
            .documents
            .iter()
            .map(|d| {
                let tag = if d.required { "required" } else { "optional" };
                format!("- {} ({tag})", d.name)
            })
            .collect();
        return format!("Documents to prepare:\n{}", lines.join("\n"));
    }

    if mentions(&lower, &["risk", "delay", "fine", "problem", "wrong"]) {
        if result.risks.is_empty() {
            return "No notable risks were flagged.".to_string();
        }
        let lines: Vec<String> = result
            .risks
            .iter()
            .map(|r| format!("- {}: {}", r.title, r.mitigation))
            .collect();
        return format!("Main risks and how to handle them:\n{}", lines.join("\n"));
    }

    if mentions(&lower, &["start", "first", "begin", "step", "next"]) {
        let ready: Vec<String> = result
            .steps
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| format!("- {}", s.title))
            .collect();
        if !ready.is_empty() {
            return format!("You can start with these right away:\n{}", ready.join("\n"));
        }
    }

    if result.summary.trim().is_empty() {
        "I can answer questions about the steps, costs, documents and risks of this case."
            .to_string()
    } else {
        result.summary.clone()
    }
}

fn follow_ups(request: &ChatRequest, result: &RunResult) -> Vec<String> {
    let asked: Vec<String> = request
        .history
        .iter()
        .map(|m| m.content.to_lowercase())
        .chain(std::iter::once(request.message.to_lowercase()))
        .collect();

    result
        .steps
        .iter()
        .filter(|s| !asked.iter().any(|a| a.contains(&s.title.to_lowercase())))
        .take(3)
        .map(|s| format!("What exactly happens during \"{}\"?", s.title))
        .collect()
}

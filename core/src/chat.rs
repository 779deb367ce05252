use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cases::RunResult;

/// Suggested follow-ups shown before the assistant has proposed its own.
pub const DEFAULT_SUGGESTED_QUESTIONS: [&str; 4] = [
    "Which step should I start with?",
    "What documents do I need to prepare?",
    "How much will the whole process cost?",
    "What are the biggest risks of delay?",
];

pub fn default_suggested_questions() -> Vec<String> {
    DEFAULT_SUGGESTED_QUESTIONS
        .iter()
        .map(|q| (*q).to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(ChatRole::User, content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(ChatRole::Assistant, content, timestamp)
    }

    fn new(role: ChatRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            content: content.into(),
            timestamp,
        }
    }
}

/// One chat turn. The server keeps no analysis state, so every turn carries
/// the run result it is about.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub process_result: Option<RunResult>,
    /// Prior messages, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_questions: Option<Vec<String>>,
}

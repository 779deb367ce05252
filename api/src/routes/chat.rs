use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use caseflow_core::cases::RunResult;
use caseflow_core::chat::{ChatRequest, ChatResponse};
use caseflow_core::error::ApiError;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/chat", post(chat_turn))
}

/// Check the required fields in the order a client is most likely to get wrong.
fn validate_chat(req: &ChatRequest) -> Result<&RunResult, AppError> {
    if req.case_id.trim().is_empty() {
        return Err(AppError::missing_field(
            "case_id",
            "Pass the case id returned when the run was submitted.",
        ));
    }
    if req.message.trim().is_empty() {
        return Err(AppError::missing_field(
            "message",
            "Send the user's question as a non-blank string.",
        ));
    }
    match &req.process_result {
        Some(result) if !result.is_empty() => Ok(result),
        _ => Err(AppError::missing_field(
            "process_result",
            "Analysis data is not kept server-side; \
             include the case's run result with every chat turn.",
        )),
    }
}

/// Answer one chat turn about a case
///
/// Stateless: the client sends the run result and recent history each time.
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Missing or blank field", body = ApiError),
        (status = 502, description = "Responder failed", body = ApiError)
    ),
    tag = "chat"
)]
pub async fn chat_turn(
    State(state): State<AppState>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let result = validate_chat(&req)?;

    tracing::debug!(
        case_id = %req.case_id,
        history = req.history.len(),
        "Chat turn"
    );

    let response = state
        .responder
        .respond(&req, result)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(response))
}

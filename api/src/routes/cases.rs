use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use caseflow_core::cases::{DirectoryEntry, SubmitRunRequest, SubmitRunResponse};
use caseflow_core::error::ApiError;
use caseflow_core::limits::{CASE_LIST_DEFAULT, CASE_LIST_MAX, parse_limit};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

const MAX_QUERY_CHARS: usize = 4_000;

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/cases", axum::routing::post(submit_run))
}

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/v1/cases", get(list_cases))
        .route("/v1/cases/{case_id}", get(get_case))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListCasesParams {
    /// Maximum number of cases (default 50, clamped to 1..=200)
    pub limit: Option<String>,
}

fn validate_query(raw: &str) -> Result<String, AppError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(AppError::missing_field(
            "query",
            "Describe the bureaucratic task, e.g. 'open a café with outdoor seating in Berlin'.",
        ));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::Validation {
            message: format!("query must be <= {MAX_QUERY_CHARS} characters"),
            field: Some("query".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(query.to_string())
}

/// Launch a run for a new case
///
/// Runs the reasoning pipeline, records the case in the in-memory directory and
/// returns the result with the activity it produced. The directory copy is not
/// durable; clients archive the response themselves.
#[utoipa::path(
    post,
    path = "/v1/cases",
    request_body = SubmitRunRequest,
    responses(
        (status = 201, description = "Run completed and case recorded", body = SubmitRunResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 502, description = "Pipeline failed", body = ApiError)
    ),
    tag = "cases"
)]
pub async fn submit_run(
    State(state): State<AppState>,
    AppJson(req): AppJson<SubmitRunRequest>,
) -> Result<impl IntoResponse, AppError> {
    let query = validate_query(&req.query)?;

    let output = state
        .pipeline
        .run(&query)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let entry = state.directory.create(&query, output.result.clone());
    tracing::info!(case_id = %entry.id, events = output.events.len(), "Run recorded");

    Ok((
        StatusCode::CREATED,
        Json(SubmitRunResponse {
            case_id: entry.id,
            created_at: entry.created_at,
            query: entry.query,
            result: output.result,
            events: output.events,
        }),
    ))
}

/// List recent cases
///
/// Newest first. `limit` defaults to 50 and is clamped to 1..=200.
#[utoipa::path(
    get,
    path = "/v1/cases",
    params(ListCasesParams),
    responses(
        (status = 200, description = "Recent cases", body = Vec<DirectoryEntry>)
    ),
    tag = "cases"
)]
pub async fn list_cases(
    State(state): State<AppState>,
    Query(params): Query<ListCasesParams>,
) -> Json<Vec<DirectoryEntry>> {
    let limit = parse_limit(params.limit.as_deref(), CASE_LIST_DEFAULT, CASE_LIST_MAX);
    Json(state.directory.list(limit as i64))
}

/// Get a case by id
#[utoipa::path(
    get,
    path = "/v1/cases/{case_id}",
    params(
        ("case_id" = String, Path, description = "Case id returned by POST /v1/cases")
    ),
    responses(
        (status = 200, description = "Case found", body = DirectoryEntry),
        (status = 404, description = "Case not found", body = ApiError)
    ),
    tag = "cases"
)]
pub async fn get_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<DirectoryEntry>, AppError> {
    state
        .directory
        .get(&case_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            resource: format!("case {case_id}"),
        })
}

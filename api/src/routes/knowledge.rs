use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use caseflow_core::error::ApiError;
use caseflow_core::limits::{KNOWLEDGE_SEARCH_DEFAULT, KNOWLEDGE_SEARCH_MAX, parse_limit};

use crate::error::AppError;
use crate::knowledge::{KnowledgeEntry, KnowledgeMatch};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/knowledge", get(list_knowledge))
        .route("/v1/knowledge/search", get(search_knowledge))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct KnowledgeSearchParams {
    /// Free-text query (required)
    pub q: Option<String>,
    /// Maximum number of matches (default 10, clamped to 1..=50)
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct KnowledgeSearchResponse {
    pub query: String,
    pub results: Vec<KnowledgeMatch>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct KnowledgeCatalogResponse {
    pub entries: Vec<KnowledgeEntry>,
    pub total: usize,
}

/// Search the procedure catalog
#[utoipa::path(
    get,
    path = "/v1/knowledge/search",
    params(KnowledgeSearchParams),
    responses(
        (status = 200, description = "Matches, best first", body = KnowledgeSearchResponse),
        (status = 400, description = "Missing query", body = ApiError)
    ),
    tag = "knowledge"
)]
pub async fn search_knowledge(
    State(state): State<AppState>,
    Query(params): Query<KnowledgeSearchParams>,
) -> Result<Json<KnowledgeSearchResponse>, AppError> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::missing_field(
            "q",
            "Pass a free-text query, e.g. /v1/knowledge/search?q=trade+registration",
        ));
    }
    let limit = parse_limit(
        params.limit.as_deref(),
        KNOWLEDGE_SEARCH_DEFAULT,
        KNOWLEDGE_SEARCH_MAX,
    );

    let results = state.knowledge.search(query, limit);
    Ok(Json(KnowledgeSearchResponse {
        query: query.to_string(),
        total: results.len(),
        results,
    }))
}

/// List the full procedure catalog
#[utoipa::path(
    get,
    path = "/v1/knowledge",
    responses(
        (status = 200, description = "Every known procedure", body = KnowledgeCatalogResponse)
    ),
    tag = "knowledge"
)]
pub async fn list_knowledge(State(state): State<AppState>) -> Json<KnowledgeCatalogResponse> {
    let entries = state.knowledge.all().to_vec();
    Json(KnowledgeCatalogResponse {
        total: entries.len(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .with_state(AppState::standalone())
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, serde_json::from_slice(&bytes).expect("body should be json"))
    }

    #[tokio::test]
    async fn search_requires_query() {
        let (status, body) = get_json("/v1/knowledge/search?q=%20%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "q");
    }

    #[tokio::test]
    async fn search_clamps_limit() {
        let (status, body) = get_json("/v1/knowledge/search?q=tax&limit=0").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["total"].as_u64().is_some_and(|n| n <= 1));
    }

    #[tokio::test]
    async fn catalog_lists_all_entries() {
        let (status, body) = get_json("/v1/knowledge").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 10);
    }
}

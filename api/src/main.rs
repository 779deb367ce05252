use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod directory;
mod error;
mod extract;
mod knowledge;
mod middleware;
mod pipeline;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Caseflow API",
        version = "0.1.0",
        description = "Stateless backend for guided bureaucratic cases. \
                       Clients own the durable copy of every case."
    ),
    paths(
        routes::health::health_check,
        routes::cases::submit_run,
        routes::cases::list_cases,
        routes::cases::get_case,
        routes::chat::chat_turn,
        routes::knowledge::search_knowledge,
        routes::knowledge::list_knowledge,
    ),
    components(schemas(
        HealthResponse,
        caseflow_core::error::ApiError,
        caseflow_core::cases::RunStatus,
        caseflow_core::cases::RunResult,
        caseflow_core::cases::GuidanceStep,
        caseflow_core::cases::CostItem,
        caseflow_core::cases::RiskItem,
        caseflow_core::cases::DocumentItem,
        caseflow_core::cases::Severity,
        caseflow_core::cases::ActivityEvent,
        caseflow_core::cases::SubmitRunRequest,
        caseflow_core::cases::SubmitRunResponse,
        caseflow_core::cases::DirectoryEntry,
        caseflow_core::chat::ChatRole,
        caseflow_core::chat::ChatMessage,
        caseflow_core::chat::ChatRequest,
        caseflow_core::chat::ChatResponse,
        knowledge::KnowledgeEntry,
        knowledge::KnowledgeMatch,
        routes::knowledge::KnowledgeSearchResponse,
        routes::knowledge::KnowledgeCatalogResponse,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Entries currently held by the in-memory case directory
    pub cases: usize,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseflow_api=debug,access_log=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let app_state = state::AppState::standalone();
    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::cases::write_router().layer(middleware::rate_limit::submit_layer()))
        .merge(routes::cases::read_router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::chat::router().layer(middleware::rate_limit::chat_layer()))
        .merge(routes::knowledge::router().layer(middleware::rate_limit::read_layer()))
        .layer(middleware::access_log::AccessLogLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Caseflow API listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use caseflow_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Resource not found (404)
    NotFound { resource: String },
    /// Reasoning pipeline or responder failed (502)
    Upstream(String),
}

impl AppError {
    /// Shorthand for a required field that was missing or blank.
    pub fn missing_field(field: &str, docs_hint: &str) -> Self {
        AppError::Validation {
            message: format!("{field} is required and must not be empty"),
            field: Some(field.to_string()),
            received: None,
            docs_hint: Some(docs_hint.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "The directory lives in server memory and is cleared on restart. \
                         The client archive remains the durable copy."
                            .to_string(),
                    ),
                },
            ),
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::UPSTREAM_FAILED.to_string(),
                        message: msg,
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some("The request can be retried as-is.".to_string()),
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

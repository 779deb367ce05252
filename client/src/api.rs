//! HTTP client for the Caseflow backend.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;

use caseflow_core::cases::{DirectoryEntry, SubmitRunRequest, SubmitRunResponse};
use caseflow_core::chat::{ChatRequest, ChatResponse};
use caseflow_core::error::ApiError;

use crate::transport::{ChatTransport, RunTransport, TransportError};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<Value, TransportError> {
        let request = self.http.get(self.url("/health"));
        send_json(request).await
    }

    /// `limit` is passed through; the server clamps it.
    pub async fn list_cases(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<DirectoryEntry>, TransportError> {
        let mut request = self.http.get(self.url("/v1/cases"));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        send_json(request).await
    }

    /// `Ok(None)` when the server has no entry for the id.
    pub async fn get_case(&self, case_id: &str) -> Result<Option<DirectoryEntry>, TransportError> {
        let request = self.http.get(self.url(&format!("/v1/cases/{case_id}")));
        match send_json(request).await {
            Ok(entry) => Ok(Some(entry)),
            Err(TransportError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn search_knowledge(
        &self,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Value, TransportError> {
        let mut request = self
            .http
            .get(self.url("/v1/knowledge/search"))
            .query(&[("q", query)]);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        send_json(request).await
    }

    pub async fn knowledge(&self) -> Result<Value, TransportError> {
        send_json(self.http.get(self.url("/v1/knowledge"))).await
    }
}

impl RunTransport for ApiClient {
    fn submit_run(
        &self,
        request: SubmitRunRequest,
    ) -> impl Future<Output = Result<SubmitRunResponse, TransportError>> + Send {
        let builder = self.http.post(self.url("/v1/cases")).json(&request);
        send_json(builder)
    }
}

impl ChatTransport for ApiClient {
    fn send_chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, TransportError>> + Send {
        let builder = self.http.post(self.url("/v1/chat")).json(&request);
        send_json(builder)
    }
}

async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::Unreachable(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Unreachable(e.to_string()))?;

    if !status.is_success() {
        return Err(rejection(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Map an error response onto the shared `ApiError` envelope when possible.
fn rejection(status: u16, body: &str) -> TransportError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) => TransportError::Rejected {
            status,
            code: error.error,
            message: match error.field {
                Some(field) => format!("{} (field: {field})", error.message),
                None => error.message,
            },
        },
        Err(_) => TransportError::Rejected {
            status,
            code: "unknown".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:3000///");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("/health"), "http://localhost:3000/health");
    }

    #[test]
    fn rejection_uses_error_envelope() {
        let body = r#"{"error":"validation_failed","message":"query is required",
            "field":"query","request_id":"r1"}"#;
        assert_eq!(
            rejection(400, body),
            TransportError::Rejected {
                status: 400,
                code: "validation_failed".to_string(),
                message: "query is required (field: query)".to_string(),
            }
        );
    }

    #[test]
    fn rejection_falls_back_to_raw_body() {
        let err = rejection(503, "Service Unavailable");
        assert_eq!(
            err,
            TransportError::Rejected {
                status: 503,
                code: "unknown".to_string(),
                message: "Service Unavailable".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let client = ApiClient::new("http://127.0.0.1:9");
        let err = client.health().await.expect_err("nothing listens there");
        assert!(matches!(err, TransportError::Unreachable(_)));
    }
}

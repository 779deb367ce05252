use std::future::Future;

use caseflow_core::cases::{SubmitRunRequest, SubmitRunResponse};
use caseflow_core::chat::{ChatRequest, ChatResponse};

/// Failure talking to the backend. Always recoverable: the caller may retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend rejected the request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Submits a query for a live run and waits for the finished result.
pub trait RunTransport: Send + Sync {
    fn submit_run(
        &self,
        request: SubmitRunRequest,
    ) -> impl Future<Output = Result<SubmitRunResponse, TransportError>> + Send;
}

/// Sends one chat turn.
pub trait ChatTransport: Send + Sync {
    fn send_chat(
        &self,
        request: ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, TransportError>> + Send;
}

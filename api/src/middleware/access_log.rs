use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service, ServiceExt};

/// Tower Layer emitting one structured `access_log` record per `/v1/` request.
///
/// Records method, route group, case id (when the path carries one), status and
/// latency. Request bodies are never logged; chat content stays out of logs.
#[derive(Clone, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);

        Box::pin(async move {
            let path = req.uri().path().to_owned();

            if !path.starts_with("/v1/") {
                return Ok(ready.oneshot(req).await.into_response());
            }

            let start = Instant::now();
            let method = req.method().to_string();
            let response = ready.oneshot(req).await.into_response();
            let (group, case_id) = parse_route(&path);

            tracing::info!(
                target: "access_log",
                method = %method,
                group = group,
                case_id = case_id.as_deref().unwrap_or("-"),
                status = response.status().as_u16(),
                latency_ms = start.elapsed().as_millis() as u64,
                "request served"
            );

            Ok(response)
        })
    }
}

/// Route group and case id from `/v1/{group}[/{case_id}]`.
fn parse_route(path: &str) -> (&'static str, Option<String>) {
    let rest = path.strip_prefix("/v1/").unwrap_or(path);
    let mut parts = rest.splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some("cases"), Some(id)) if !id.is_empty() => ("cases", Some(id.to_string())),
        (Some("cases"), _) => ("cases", None),
        (Some("chat"), _) => ("chat", None),
        (Some("knowledge"), _) => ("knowledge", None),
        _ => ("other", None),
    }
}

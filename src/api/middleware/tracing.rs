//! HTTP request/response tracing middleware.

use axum::body::Body;
use axum::http::{Request, Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, TraceLayer};
use tracing::Span;

type MakeSpanFn = fn(&Request<Body>) -> Span;
type OnResponseFn = fn(&Response<Body>, Duration, &Span);

/// Paths polled by supervisors; traced at `DEBUG` only.
const PROBE_PATHS: &[&str] = &["/health"];

/// Creates a tracing middleware for HTTP requests.
///
/// Every request gets a `request{method, uri}` span at `INFO`, except health
/// probes which get a `DEBUG` span. Responses are logged inside the span with
/// status and latency; server errors at `WARN`.
///
/// # Example Logs
///
/// ```text
/// INFO request{method=GET uri=/abc12}: response status=307 latency_ms=1
/// WARN request{method=GET uri=/abc12}: response status=503 latency_ms=5002
/// ```
pub fn layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeSpanFn, DefaultOnRequest, OnResponseFn>
{
    TraceLayer::new_for_http()
        .make_span_with(request_span as MakeSpanFn)
        .on_response(log_response as OnResponseFn)
}

fn request_span(request: &Request<Body>) -> Span {
    let method = request.method();
    let uri = request.uri();

    if PROBE_PATHS.contains(&uri.path()) {
        tracing::debug_span!("request", %method, %uri)
    } else {
        tracing::info_span!("request", %method, %uri)
    }
}

fn log_response(response: &Response<Body>, latency: Duration, span: &Span) {
    if span.is_disabled() {
        return;
    }

    let status = response.status().as_u16();
    let latency_ms = latency.as_millis() as u64;

    if response.status().is_server_error() {
        tracing::warn!(parent: span, status, latency_ms, "response");
    } else {
        tracing::info!(parent: span, status, latency_ms, "response");
    }
}

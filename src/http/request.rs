//! Request correlation.
//!
//! Every request carries an `x-request-id`: the caller's if present,
//! otherwise a UUID v4 set by `SetRequestIdLayer`. The id is echoed on the
//! response and recorded on the request span.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request};
use tracing::Span;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id header value, or `"unknown"` if absent or not visible ASCII.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Span for one inbound request.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id(request.headers()),
    )
}

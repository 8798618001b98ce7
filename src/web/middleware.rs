use crate::admission::AdmissionController;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{debug, info_span, Span};
use uuid::Uuid;

/// Per-request trace identifier header
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Reject with 429 when the bucket is empty, before any handler runs.
pub async fn admit(
    State(admission): State<Arc<AdmissionController>>,
    request: Request,
    next: Next,
) -> Response {
    if admission.try_admit() {
        return next.run(request).await;
    }
    debug!("Request rejected by admission control");
    StatusCode::TOO_MANY_REQUESTS.into_response()
}

/// Drop any client-sent request id so the server always mints its own.
pub async fn strip_client_request_id(mut request: Request, next: Next) -> Response {
    request.headers_mut().remove(&REQUEST_ID_HEADER);
    next.run(request).await
}

/// 32 hex characters from a random v4 UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTraceId;

impl MakeRequestId for MakeTraceId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().simple().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Span for one HTTP request. Carries the route template rather than the
/// concrete path so codes never reach the logs.
pub fn request_span(request: &Request) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str);
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "request",
        method = %request.method(),
        route,
        request_id,
    )
}

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, MatchedPath},
    http::{HeaderMap, HeaderName, HeaderValue, Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::observability;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_CORRELATION_ID_LEN: usize = 128;

/// Correlation id of the current request. Handlers record it on the audit
/// events they emit so a custody change can be traced back to the caller's
/// request chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<CorrelationId>() {
            return Ok(id.clone());
        }
        Ok(CorrelationId(
            header_str(&parts.headers, CORRELATION_ID_HEADER)
                .unwrap_or("-")
                .to_string(),
        ))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Caller-supplied ids are kept when they are short printable ASCII; a missing
/// header gets a fresh uuid v7.
fn resolve_correlation_id(headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(value) = headers.get(CORRELATION_ID_HEADER) else {
        return Ok(Uuid::now_v7().to_string());
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Validation("invalid correlation id".into()))?
        .trim();
    if value.is_empty() || value.len() > MAX_CORRELATION_ID_LEN {
        return Err(ApiError::Validation(format!(
            "correlation id must be 1 to {MAX_CORRELATION_ID_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

#[derive(Clone)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan> {
    TraceLayer::new_for_http().make_span_with(RequestSpan)
}

#[derive(Clone, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let headers = req.headers();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or("-");
        info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            route = %route,
            request_id = %header_str(headers, REQUEST_ID_HEADER).unwrap_or("-"),
            correlation_id = %header_str(headers, CORRELATION_ID_HEADER).unwrap_or("-")
        )
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::x_request_id(UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

pub fn timeout_layer(secs: u64) -> TimeoutLayer {
    TimeoutLayer::new(Duration::from_secs(secs))
}

/// Resolves the correlation id, exposes it to handlers as an extension and
/// echoes it on the response.
pub async fn correlation_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let correlation_id = match resolve_correlation_id(req.headers()) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };
    let header_value = HeaderValue::from_str(&correlation_id).ok();
    let header_name = HeaderName::from_static(CORRELATION_ID_HEADER);

    if let Some(value) = header_value.clone() {
        req.headers_mut().insert(header_name.clone(), value);
    }
    req.extensions_mut().insert(CorrelationId(correlation_id));

    let mut response = next.run(req).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(header_name, value);
    }
    response
}

pub async fn metrics_layer(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_string(), |matched| matched.as_str().to_string());
    let response = next.run(req).await;
    observability::register_http_request(&method, &route, response.status(), start.elapsed());
    response
}

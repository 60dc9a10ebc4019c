//! Request correlation middleware.
//!
//! Opens a telemetry [`Scope`] for every request it wraps, makes it available
//! to handlers through request extensions, and records the transaction once
//! the response is ready.

use std::time::Instant;

use axum::{
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::{request::Parts, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::http::error::ApiError;
use crate::telemetry::{CorrelationContext, Scope, Telemetry};

/// W3C trace context header.
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub async fn correlation_middleware(
    State(telemetry): State<Telemetry>,
    mut req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let incoming = req
        .headers()
        .get(TRACEPARENT)
        .and_then(|v| v.to_str().ok());
    let context = match incoming.map(CorrelationContext::from_traceparent) {
        Some(Some(parent)) => parent,
        Some(None) => {
            tracing::debug!(traceparent = ?incoming, "Ignoring malformed traceparent");
            CorrelationContext::new()
        }
        None => CorrelationContext::new(),
    };
    let scope = telemetry.scope(context);

    if let Some(request_id) = req.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
        scope.label("request_id", request_id);
    }

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let name = format!("{} {}", req.method(), route);

    req.extensions_mut().insert(scope.clone());
    let mut response = next.run(req).await;

    let status = response.status().as_u16();
    scope.finish_transaction(name, status, start.elapsed());

    if let Ok(value) = HeaderValue::from_str(&scope.context().traceparent()) {
        response.headers_mut().insert(TRACEPARENT, value);
    }
    response
}

impl<S> FromRequestParts<S> for Scope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Scope>()
            .cloned()
            .ok_or(ApiError::MissingScope)
    }
}

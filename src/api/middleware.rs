//! API Middleware
//!
//! Request context capture and request logging.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Header naming the acting staff member
pub const ACTOR_HEADER: &str = "x-actor";

/// Header carrying the correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// =========================================================================
// Operation context
// =========================================================================

/// Build the `OperationContext` of a request from its headers.
///
/// A missing or malformed correlation id is replaced by a fresh one.
pub fn context_from_headers(headers: &HeaderMap) -> OperationContext {
    let mut context = OperationContext::new();

    if let Some(actor) = headers.get(ACTOR_HEADER).and_then(|v| v.to_str().ok()) {
        context = context.with_actor(actor);
    }

    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4);

    context.with_correlation_id(correlation_id)
}

/// Insert the request's `OperationContext` into its extensions
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let mut context = context_from_headers(request.headers());

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    let correlation_id = context.correlation_id;
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;

    // Echo the correlation id so callers can find the request in the logs
    if let Some(value) = correlation_id.and_then(|id| id.to_string().parse().ok()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }

    response
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
///
/// Runs inside `context_middleware`, so the correlation id is available.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let (correlation_id, actor) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (ctx.correlation_id, ctx.actor.clone()))
        .unwrap_or((None, None));

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        actor = ?actor,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            correlation_id = ?correlation_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            correlation_id = ?correlation_id,
            "Request completed"
        );
    }

    response
}

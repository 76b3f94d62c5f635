//! API Middleware
//!
//! Session extraction, the maintenance gate and request logging.

use std::net::IpAddr;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::domain::{OperationContext, ADMIN_ROLE};
use crate::error::AppError;
use crate::profile::NotificationBuffer;

use super::state::AppState;

/// Bearer token of the current request
#[derive(Debug, Clone)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =========================================================================
// Session extraction
// =========================================================================

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// First hop of `X-Forwarded-For`
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

/// Context for requests that carry no session
pub fn operation_context(headers: &HeaderMap) -> OperationContext {
    // Caller-supplied id first, then the one assigned by the request-id layer
    let correlation_id = ["X-Correlation-Id", "x-request-id"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find_map(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    OperationContext::for_request(correlation_id, client_ip(headers))
}

/// Require a bearer token and attach it with the operation context.
///
/// The token is only resolved to a principal by the handlers, so a revoked
/// session surfaces as `session_expired` together with its notification.
pub async fn session_middleware(mut request: Request<Body>, next: Next) -> Result<Response, Response> {
    let token = match bearer_token(request.headers()) {
        Some(token) => token.to_string(),
        None => return Err(AppError::MissingSession.into_response()),
    };

    let context = operation_context(request.headers());
    request.extensions_mut().insert(AccessToken(token));
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// Maintenance gate
// =========================================================================

/// While maintenance mode is on only admins get through.
pub async fn maintenance_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if !state.maintenance.is_enabled() {
        return Ok(next.run(request).await);
    }

    let token = match request.extensions().get::<AccessToken>() {
        Some(token) => token.clone(),
        None => return Err(AppError::UnderMaintenance.into_response()),
    };

    let notifications = NotificationBuffer::new();
    let principal = match state.profiles.authenticate(token.as_str(), &notifications).await {
        Ok(principal) => principal,
        Err(err) => return Err(AppError::profile(err, notifications.take()).into_response()),
    };

    match state.profiles.roles(principal.id).await {
        Ok(roles) if roles.iter().any(|r| r == ADMIN_ROLE) => Ok(next.run(request).await),
        Ok(_) => {
            tracing::debug!(principal_id = %principal.id, "Request refused during maintenance");
            Err(AppError::UnderMaintenance.into_response())
        }
        Err(e) => Err(AppError::from(crate::profile::ProfileError::from(e)).into_response()),
    }
}

// =========================================================================
// Request logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
];

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

/// Request logging middleware
pub async fn logging_middleware(
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = ?request_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        request_id = ?request_id,
        "Request completed"
    );

    response
}

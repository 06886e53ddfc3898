//! API middleware

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use app_services::RequestContext;
use core_kernel::CorrelationId;

use crate::auth::validate_token;
use crate::error::ApiError;
use crate::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Authentication middleware
///
/// Validates the bearer token and stores its [`crate::auth::Claims`] and the
/// derived [`RequestContext`] in the request extensions. A well-formed
/// `x-correlation-id` header is carried into the context.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("Missing or invalid Authorization header");
            ApiError::Unauthorized("a bearer token is required".to_string())
        })?;

    let claims = validate_token(token, &state.config.jwt_secret).map_err(|e| {
        warn!(error = %e, "Token validation failed");
        ApiError::from(e)
    })?;

    let mut ctx = claims.to_context();
    if let Some(correlation_id) = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.parse::<CorrelationId>().ok())
    {
        ctx = ctx.with_correlation_id(correlation_id);
    }

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Audit logging middleware
///
/// Logs every API request with its caller and echoes the correlation id.
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let caller = request.extensions().get::<RequestContext>().map(|ctx| {
        (
            ctx.tenant_id.to_string(),
            ctx.performing_user_id
                .map_or_else(|| "anonymous".to_string(), |u| u.to_string()),
            ctx.correlation_id,
        )
    });

    let start = Instant::now();
    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    match caller {
        Some((tenant, user, correlation_id)) => {
            info!(
                method = %method,
                uri = %uri,
                tenant = %tenant,
                user = %user,
                correlation_id = %correlation_id,
                status = status.as_u16(),
                duration_ms,
                "API request"
            );
            if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_HEADER, value);
            }
        }
        None => info!(method = %method, uri = %uri, status = status.as_u16(), duration_ms, "API request"),
    }

    response
}

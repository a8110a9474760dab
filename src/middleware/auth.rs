use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use shared::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::state::AppState;

fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header");
            AppError::authentication("Authentication required. Please provide a Bearer token.")
        })?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::authentication("Authorization header must start with 'Bearer '"))?;

    if token.is_empty() {
        return Err(AppError::authentication("Empty bearer token"));
    }
    Ok(token)
}

/// Validates the bearer token and stores the caller's [`RequestContext`]
/// in the request extensions.
pub async fn extract_context(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.auth.validate(bearer_token(&request)?)?;
    let ctx = RequestContext::from(claims);
    debug!(user_id = %ctx.user_id, role = %ctx.role, "Request authenticated");

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Rejects callers without a merchant or admin role. Runs after
/// [`extract_context`].
pub async fn require_staff(request: Request, next: Next) -> Result<Response, AppError> {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .ok_or_else(|| AppError::authentication("Authentication required"))?;

    if !ctx.is_staff() {
        warn!(user_id = %ctx.user_id, role = %ctx.role, "Counter access denied");
        return Err(AppError::authorization("Counter access requires a merchant account"));
    }
    Ok(next.run(request).await)
}

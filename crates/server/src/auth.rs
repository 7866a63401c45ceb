//! Shared-secret authentication.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared secret.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Reject any request whose `X-Session-Token` does not match the configured
/// secret, before it reaches a handler.
pub async fn require_session_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(SESSION_TOKEN_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if bool::from(presented.ct_eq(state.auth_token.as_bytes())) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "rejected request with missing or wrong session token"
        );
        Err(ApiError::Forbidden)
    }
}

//! Remote-exec server library.
//!
//! Axum gateway in front of the `remote-exec-jobs` supervision core. Every
//! request must carry the shared session token; handlers run commands, manage
//! background jobs and accept file uploads.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod response;
pub mod routes;
pub mod state;

pub use config::{Cli, ConfigError, ServerConfig, Transport};
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::{http::StatusCode, middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// The token check wraps the fallback too, so unknown paths answer 403 to
/// unauthenticated callers and 404 otherwise.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api_routes(&state))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use remote_exec_jobs::FileRoot;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new("s3cret", FileRoot::new(dir.path()), Duration::from_millis(50));
        (create_app(state), dir)
    }

    #[tokio::test]
    async fn test_unknown_path_with_token_is_404() {
        let (app, _dir) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .header(auth::SESSION_TOKEN_HEADER, "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_path_without_token_is_403() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

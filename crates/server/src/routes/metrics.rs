//! `GET /metrics`: job and run counters for Prometheus scrapers.
//!
//! Sits behind the session-token check like every other route, so scrapers
//! must send `X-Session-Token`.

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::metrics::render_metrics;
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render the exposition text, or 503 when the binary never installed the
/// recorder (as in tests that build the app directly).
pub async fn metrics_handler() -> Response {
    let Some(exposition) = render_metrics() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], exposition).into_response()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use remote_exec_jobs::{CommandSpec, FileRoot};
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_report_background_jobs() {
        crate::metrics::init_metrics();

        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new("t", FileRoot::new(dir.path()), Duration::from_millis(50));
        state
            .executor
            .run_in_background(&CommandSpec::new("true", Vec::<String>::new()))
            .await
            .unwrap();
        let app = router().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(remote_exec_jobs::metrics::JOBS_SPAWNED_TOTAL));
    }
}

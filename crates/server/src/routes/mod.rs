//! Route handlers for the remote-exec server.

pub mod jobs;
pub mod metrics;
pub mod run;
pub mod system;
pub mod upload;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router for every endpoint.
///
/// Routes (any method unless noted):
/// - /version - Server version
/// - /exit - Shut the server down
/// - /runToCompletion - Run a command and return its output
/// - /runInBackground - Start a background job
/// - /jobs - List background jobs
/// - /kill - Kill one or all background jobs
/// - POST /upload - Store a multipart file
/// - GET /metrics - Prometheus metrics
pub fn api_routes(state: &AppState) -> Router<Arc<AppState>> {
    Router::new()
        .merge(system::router())
        .merge(run::router())
        .merge(jobs::router())
        .merge(upload::router(state.max_upload_bytes))
        .merge(metrics::router())
}

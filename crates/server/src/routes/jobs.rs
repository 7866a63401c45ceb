//! API routes for background job management.
//!
//! - /jobs - List registered background jobs
//! - /kill - Kill one job, or all of them with `{"job": -1}`

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::any, Router};
use remote_exec_jobs::{JobNo, JobSummary, KillTarget};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::response::{decode_body, PrettyJson};
use crate::state::AppState;

/// Body of a kill request.
#[derive(Debug, Deserialize)]
pub struct KillRequest {
    pub job: JobNo,
}

/// /jobs - List all registered jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult<PrettyJson<Vec<JobSummary>>> {
    Ok(PrettyJson(state.registry().list().await?))
}

/// /kill - Kill a job. Unknown job numbers succeed without effect.
async fn kill_job(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<PrettyJson<bool>> {
    let request: KillRequest = decode_body(&body)?;
    let killed = state.registry().kill(KillTarget::from(request.job)).await?;
    tracing::debug!(job = request.job, killed, "kill handled");
    Ok(PrettyJson(true))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", any(list_jobs))
        .route("/kill", any(kill_job))
}

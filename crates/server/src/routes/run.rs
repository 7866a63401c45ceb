//! Command execution endpoints.
//!
//! - /runToCompletion - run a command and wait for it
//! - /runInBackground - start a command as a background job

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::any, Router};
use remote_exec_jobs::{CommandSpec, RunOutput};

use crate::error::ApiResult;
use crate::response::{decode_body, PrettyJson};
use crate::state::AppState;

/// /runToCompletion - Run a command, blocking until it exits or its
/// `timeout` (seconds, if positive) elapses.
///
/// Body: `{timeout, cmd, args}`. A nonzero exit status is reported in
/// `exitCode`, not as an error.
pub async fn run_to_completion(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<PrettyJson<RunOutput>> {
    let spec: CommandSpec = decode_body(&body)?;
    tracing::debug!(cmd_line = %spec.command_line(), timeout = spec.timeout, "runToCompletion");
    let output = state.executor.run_to_completion(&spec).await?;
    Ok(PrettyJson(output))
}

/// /runInBackground - Spawn a command and register it as a job.
///
/// Body: `{timeout, cmd, args, stdout?, stderr?}`. Returns as soon as the
/// process is registered.
pub async fn run_in_background(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<PrettyJson<bool>> {
    let spec: CommandSpec = decode_body(&body)?;
    let job_no = state.executor.run_in_background(&spec).await?;
    tracing::debug!(job_no, cmd_line = %spec.command_line(), "runInBackground accepted");
    Ok(PrettyJson(true))
}

/// Build the execution router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/runToCompletion", any(run_to_completion))
        .route("/runInBackground", any(run_in_background))
}

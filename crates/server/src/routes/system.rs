//! Server information and lifecycle endpoints.
//!
//! - /version - server version
//! - /exit - stop the server after a short grace delay

use std::sync::Arc;

use axum::{extract::State, routing::any, Router};
use serde::Serialize;

use crate::response::PrettyJson;
use crate::state::AppState;

/// Response for the version endpoint.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct VersionResponse {
    pub version: String,
}

/// /version - Server version.
pub async fn version() -> PrettyJson<VersionResponse> {
    PrettyJson(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// /exit - Acknowledge, then trigger shutdown once the grace delay has passed
/// so the response can reach the client.
pub async fn exit(State(state): State<Arc<AppState>>) -> PrettyJson<bool> {
    tracing::info!(grace = ?state.exit_grace, "exit requested");
    let shutdown = state.shutdown.clone();
    let grace = state.exit_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        shutdown.cancel();
    });
    PrettyJson(true)
}

/// Build the system router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/version", any(version))
        .route("/exit", any(exit))
}

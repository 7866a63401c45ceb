//! File upload endpoint.
//!
//! - POST /upload - store the multipart field `file` under its file name

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Router,
};
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, ApiResult};
use crate::response::PrettyJson;
use crate::state::AppState;

/// Multipart field that carries the uploaded file.
const FILE_FIELD: &str = "file";

/// POST /upload - Write the `file` part to the file root.
///
/// The part's file name is resolved like a capture path. Other parts are
/// ignored.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<PrettyJson<bool>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field
            .file_name()
            .ok_or_else(|| ApiError::BadRequest("file part has no file name".to_string()))?
            .to_string();
        let path = state.executor.files().resolve(&name)?;

        let write_err = |source| ApiError::Write {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        let mut bytes = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            bytes += chunk.len();
            file.write_all(&chunk).await.map_err(write_err)?;
        }
        file.flush().await.map_err(write_err)?;

        tracing::info!(path = %path.display(), bytes, "file uploaded");
        return Ok(PrettyJson(true));
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart field `{FILE_FIELD}`"
    )))
}

/// Build the upload router.
pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().route(
        "/upload",
        post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
}

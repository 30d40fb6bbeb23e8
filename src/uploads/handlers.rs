use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    error::ApiError,
    state::AppState,
    uploads::services::{ext_from_mime, store_image},
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub public_id: String,
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Keeps the multipart status: an oversized body is a 413, anything else a 400.
fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(limit = MAX_UPLOAD_BYTES, "upload over size limit");
        ApiError::PayloadTooLarge(format!("File exceeds {} MB", MAX_UPLOAD_BYTES / (1024 * 1024)))
    } else {
        ApiError::validation(err.body_text())
    }
}

/// POST /upload (multipart), field `file`.
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        file = Some((content_type, data));
        break;
    }

    let (content_type, data) = file.ok_or_else(|| ApiError::validation("file is required"))?;
    if data.is_empty() {
        return Err(ApiError::validation("file is empty"));
    }
    if ext_from_mime(&content_type).is_none() {
        warn!(%content_type, "rejected upload");
        return Err(ApiError::validation("Only image uploads are supported"));
    }

    let size = data.len();
    let stored = store_image(state.storage.as_ref(), data, &content_type).await?;
    info!(key = %stored.key, size, "image uploaded");
    Ok(Json(UploadResponse {
        url: stored.url,
        public_id: stored.key,
    }))
}

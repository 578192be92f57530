use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use precinct_domain::evidence::MediaFile;
use precinct_domain::media::PendingMedia;
use serde::Serialize;

use crate::{error::ApiError, observability, state::AppState};

const MEDIA_FIELD: &str = "media";

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/media", post(upload_media))
        .route("/v1/media/:handle", get(download_media))
}

#[derive(Serialize)]
struct UploadResponse {
    files: Vec<MediaFile>,
}

fn map_multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(err.body_text());
    }
    ApiError::Validation(format!("invalid multipart body: {}", err.body_text()))
}

async fn upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut pending = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        if field.name() != Some(MEDIA_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(map_multipart_error)?;
        pending.push(PendingMedia {
            name,
            content_type,
            bytes,
        });
    }

    let sizes: Vec<usize> = pending.iter().map(|file| file.bytes.len()).collect();
    let files = state.media.upload_all(pending).await?;
    for (file, size) in files.iter().zip(sizes) {
        observability::register_media_upload(
            file.content_type.as_deref().unwrap_or_default(),
            size,
        );
    }
    tracing::info!(count = files.len(), "media upload completed");
    Ok((StatusCode::CREATED, Json(UploadResponse { files })))
}

async fn download_media(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.media.download(&handle).await?;
    let metadata = download.metadata;

    let mut response = Body::from_stream(download.body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&metadata.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.size));
    let disposition = format!(
        "inline; filename=\"{}\"",
        metadata.original_name.replace(['"', '\\'], "_")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

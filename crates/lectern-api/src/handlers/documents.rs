//! Document handlers: direct upload, metadata, content streaming, and
//! operator replay.
//!
//! Readers never see a partially rendered document: content requests against
//! anything other than a COMPLETED asset answer 423 (locked), a polling
//! signal rather than an error.

use crate::auth::UserContext;
use crate::error::{storage_error_to_app, ErrorResponse, HttpAppError};
use crate::services::upload::{IngestOutcome, IngestRequest};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lectern_core::models::{AssetResponse, RenderJobPayload, RENDER_DOCUMENT_JOB};
use lectern_core::AppError;
use lectern_db::AssetStore;
use lectern_storage::Storage;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Response for a queued secure-path upload
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    pub id: Uuid,
    pub status: String,
}

/// Response for a direct publish
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedResponse {
    pub id: Uuid,
    pub url: String,
    pub status: String,
}

/// Upload a small document in a single request
///
/// Multipart fields: the document bytes in a `file` part, plus an optional
/// `secure` field ("true"/"false", default true). Same authorization and
/// routing rules as the chunked protocol: direct-publish is synchronous,
/// the secure path answers 202 with `{"status":"QUEUED"}`.
#[utoipa::path(
    post,
    path = "/api/v0/containers/{container_id}/documents",
    tag = "documents",
    params(
        ("container_id" = Uuid, Path, description = "Target container id")
    ),
    responses(
        (status = 200, description = "Document published", body = PublishedResponse),
        (status = 202, description = "Document queued for rendering", body = QueuedResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "No management rights on container", body = ErrorResponse)
    )
)]
pub async fn upload_document(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut secure = true;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        HttpAppError(AppError::InvalidRequest(format!(
            "Malformed multipart body: {}",
            e
        )))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(String::from);
                content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(|e| {
                    HttpAppError(AppError::InvalidRequest(format!(
                        "Failed to read file bytes: {}",
                        e
                    )))
                })?;
                data = Some(bytes.to_vec());
            }
            "secure" => {
                let text = field.text().await.map_err(|e| {
                    HttpAppError(AppError::InvalidRequest(format!(
                        "Failed to read secure field: {}",
                        e
                    )))
                })?;
                secure = text.trim().eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    let data = data
        .ok_or_else(|| HttpAppError(AppError::InvalidRequest("Missing file part".to_string())))?;
    let filename = filename
        .ok_or_else(|| HttpAppError(AppError::InvalidRequest("Missing filename".to_string())))?;
    let content_type = content_type.ok_or_else(|| {
        HttpAppError(AppError::InvalidRequest("Missing content type".to_string()))
    })?;

    if data.len() as u64 > state.config.max_upload_size_bytes {
        return Err(HttpAppError(AppError::PayloadTooLarge(format!(
            "File size {} exceeds maximum {} bytes; use the chunked upload protocol",
            data.len(),
            state.config.max_upload_size_bytes
        ))));
    }

    state.upload.validate_document_type(&filename, &content_type)?;
    state
        .upload
        .authorize_container(user.user_id, container_id)
        .await?;

    let outcome = state
        .upload
        .ingest(IngestRequest {
            container_id,
            filename,
            content_type,
            secure,
            data,
        })
        .await?;

    match outcome {
        IngestOutcome::Published { asset, url } => Ok((
            StatusCode::OK,
            Json(PublishedResponse {
                id: asset.id,
                url,
                status: "COMPLETED".to_string(),
            }),
        )
            .into_response()),
        IngestOutcome::Queued { asset, .. } => Ok((
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                id: asset.id,
                status: "QUEUED".to_string(),
            }),
        )
            .into_response()),
    }
}

/// Get document metadata and render status
#[utoipa::path(
    get,
    path = "/api/v0/documents/{asset_id}",
    tag = "documents",
    params(
        ("asset_id" = Uuid, Path, description = "Asset id")
    ),
    responses(
        (status = 200, description = "Asset metadata", body = AssetResponse),
        (status = 404, description = "Asset not found", body = ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state
        .assets
        .get(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;

    Ok(Json(AssetResponse::from(asset)))
}

/// Stream a rendered document
///
/// Answers 423 while the asset is still PROCESSING (or FAILED) so readers
/// can poll; never serves from an empty storage key.
#[utoipa::path(
    get,
    path = "/api/v0/documents/{asset_id}/content",
    tag = "documents",
    params(
        ("asset_id" = Uuid, Path, description = "Asset id")
    ),
    responses(
        (status = 200, description = "Document bytes"),
        (status = 404, description = "Asset not found", body = ErrorResponse),
        (status = 423, description = "Still rendering", body = ErrorResponse)
    )
)]
pub async fn get_document_content(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    let asset = state
        .assets
        .get(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;

    if !asset.is_available() {
        return Err(HttpAppError(AppError::Locked(format!(
            "Document is not ready: {}",
            asset.render_status
        ))));
    }

    let stream = state
        .storage
        .download_stream(&asset.storage_key)
        .await
        .map_err(storage_error_to_app)?;

    let disposition = format!("inline; filename=\"{}\"", asset.download_name());
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, lectern_core::constants::CANONICAL_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Replay a failed render
///
/// Operator action: re-marks the asset PROCESSING and enqueues a fresh job
/// against the still-staged source. Fails with 404 when the staged source is
/// no longer retrievable.
#[utoipa::path(
    post,
    path = "/api/v0/documents/{asset_id}/replay",
    tag = "documents",
    params(
        ("asset_id" = Uuid, Path, description = "Asset id")
    ),
    responses(
        (status = 202, description = "Render job re-enqueued", body = QueuedResponse),
        (status = 400, description = "Asset is not a secured document", body = ErrorResponse),
        (status = 403, description = "No management rights on container", body = ErrorResponse),
        (status = 404, description = "Asset or staged source not found", body = ErrorResponse)
    )
)]
pub async fn replay_render(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let asset = state
        .assets
        .get(asset_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;

    if !asset.is_secure {
        return Err(HttpAppError(AppError::InvalidRequest(
            "Only secured documents can be replayed".to_string(),
        )));
    }

    state
        .upload
        .authorize_container(user.user_id, asset.container_id)
        .await?;

    let extension = lectern_storage::keys::file_extension(&asset.title);
    let source_key = lectern_storage::keys::staging_key(asset.id, &extension);
    let staged = state
        .storage
        .exists(&source_key)
        .await
        .map_err(storage_error_to_app)?;
    if !staged {
        return Err(HttpAppError(AppError::NotFound(format!(
            "Staged source no longer retrievable: {}",
            source_key
        ))));
    }

    state.assets.mark_processing(asset.id).await?;

    let payload = RenderJobPayload {
        source_key,
        content_type: lectern_processing::format::content_type_for_extension(&extension)
            .unwrap_or("application/octet-stream")
            .to_string(),
        original_filename: asset.title.clone(),
        asset_id: asset.id,
        brand_label: None,
    };

    let job_id = state
        .queue
        .submit(RENDER_DOCUMENT_JOB, &payload)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to enqueue render job: {}", e)))?;

    tracing::info!(
        asset_id = %asset.id,
        job_id = %job_id,
        "Render replay enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            id: asset.id,
            status: "QUEUED".to_string(),
        }),
    ))
}

//! Chunked upload handlers.
//!
//! Resumable transfer protocol: init opens a session and advertises the
//! fixed chunk size, chunks arrive out of order (and concurrently) as
//! multipart posts, finalize assembles and routes the file. Progress is
//! `(received, total)` so clients can resume after a disconnect.

use crate::auth::UserContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::services::upload::InitUpload;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lectern_core::AppError;
use lectern_db::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Request to start a chunked upload
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    /// Original filename
    pub filename: String,
    /// Total file size in bytes
    pub file_size: u64,
    /// Declared number of chunks; must equal ceil(fileSize / chunkSize)
    pub total_chunks: i32,
    /// Content type (MIME type)
    pub mime_type: String,
    /// Container the finished document belongs to
    pub target_container_id: Uuid,
    /// Whether the document must be secured (converted, watermarked,
    /// privately stored). Non-PDF sources are secured regardless.
    #[serde(default = "default_secure")]
    pub secure: bool,
}

fn default_secure() -> bool {
    true
}

/// Response for starting a chunked upload
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    /// Opaque session id for subsequent chunk and finalize calls
    pub upload_id: Uuid,
    /// Fixed chunk size in bytes; every chunk except the last must be
    /// exactly this long
    pub chunk_size: u64,
    pub total_chunks: i32,
}

/// Response for chunk upload progress
#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkProgressResponse {
    /// Number of distinct chunk indices received
    pub received: i32,
    /// Total number of chunks in the session
    pub total: i32,
}

/// Request to finalize a chunked upload
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUploadRequest {
    pub upload_id: Uuid,
    /// Must match the container declared at init when present
    pub target_container_id: Option<Uuid>,
    /// Echo of the init secure flag; informational
    pub secure: Option<bool>,
}

/// Response for a finalized upload
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeUploadResponse {
    pub asset_id: Uuid,
    /// Storage key of the published file; empty while the secure path is
    /// still rendering
    pub storage_key: String,
    /// "COMPLETED" for direct publishes, "QUEUED" for the secure path
    pub status: String,
}

/// Start a chunked upload session
#[utoipa::path(
    post,
    path = "/api/v0/uploads/init",
    tag = "uploads",
    request_body = InitUploadRequest,
    responses(
        (status = 201, description = "Upload session created", body = InitUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "No management rights on container", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
pub async fn init_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let session = state
        .upload
        .init_upload(
            user.user_id,
            InitUpload {
                filename: request.filename,
                file_size: request.file_size,
                total_chunks: request.total_chunks,
                content_type: request.mime_type,
                container_id: request.target_container_id,
                secure: request.secure,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitUploadResponse {
            upload_id: session.id,
            chunk_size: session.chunk_size as u64,
            total_chunks: session.total_chunks,
        }),
    ))
}

/// Upload a single chunk
///
/// Multipart fields: `uploadId`, `chunkIndex`, `totalChunks`, and the raw
/// chunk bytes in a `file` part.
#[utoipa::path(
    post,
    path = "/api/v0/uploads/chunk",
    tag = "uploads",
    responses(
        (status = 200, description = "Chunk received", body = ChunkProgressResponse),
        (status = 400, description = "Invalid chunk index or size", body = ErrorResponse),
        (status = 404, description = "Session missing or expired", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut upload_id: Option<Uuid> = None;
    let mut chunk_index: Option<i32> = None;
    let mut total_chunks: Option<i32> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        HttpAppError(AppError::InvalidRequest(format!(
            "Malformed multipart body: {}",
            e
        )))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "uploadId" => {
                let text = read_text_field(field, "uploadId").await?;
                upload_id = Some(Uuid::parse_str(&text).map_err(|_| {
                    HttpAppError(AppError::InvalidRequest("Invalid uploadId".to_string()))
                })?);
            }
            "chunkIndex" => {
                let text = read_text_field(field, "chunkIndex").await?;
                chunk_index = Some(text.parse().map_err(|_| {
                    HttpAppError(AppError::InvalidRequest("Invalid chunkIndex".to_string()))
                })?);
            }
            "totalChunks" => {
                let text = read_text_field(field, "totalChunks").await?;
                total_chunks = Some(text.parse().map_err(|_| {
                    HttpAppError(AppError::InvalidRequest("Invalid totalChunks".to_string()))
                })?);
            }
            "file" => {
                let bytes = field.bytes().await.map_err(|e| {
                    HttpAppError(AppError::InvalidRequest(format!(
                        "Failed to read chunk bytes: {}",
                        e
                    )))
                })?;
                data = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let upload_id = upload_id
        .ok_or_else(|| HttpAppError(AppError::InvalidRequest("Missing uploadId".to_string())))?;
    let chunk_index = chunk_index
        .ok_or_else(|| HttpAppError(AppError::InvalidRequest("Missing chunkIndex".to_string())))?;
    let total_chunks = total_chunks.ok_or_else(|| {
        HttpAppError(AppError::InvalidRequest("Missing totalChunks".to_string()))
    })?;
    let data = data
        .ok_or_else(|| HttpAppError(AppError::InvalidRequest("Missing file part".to_string())))?;

    let progress = state
        .upload
        .upload_chunk(user.user_id, upload_id, chunk_index, total_chunks, data)
        .await?;

    Ok(Json(ChunkProgressResponse {
        received: progress.received,
        total: progress.total,
    }))
}

/// Get upload progress
#[utoipa::path(
    get,
    path = "/api/v0/uploads/{upload_id}",
    tag = "uploads",
    params(
        ("upload_id" = Uuid, Path, description = "Upload session id")
    ),
    responses(
        (status = 200, description = "Upload progress", body = ChunkProgressResponse),
        (status = 404, description = "Session missing or expired", body = ErrorResponse)
    )
)]
pub async fn upload_progress(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let progress = state.upload.progress(user.user_id, upload_id).await?;
    Ok(Json(ChunkProgressResponse {
        received: progress.received,
        total: progress.total,
    }))
}

/// Finalize a chunked upload by assembling chunks
#[utoipa::path(
    post,
    path = "/api/v0/uploads/finalize",
    tag = "uploads",
    request_body = FinalizeUploadRequest,
    responses(
        (status = 200, description = "Upload finalized", body = FinalizeUploadResponse),
        (status = 400, description = "Chunks missing", body = ErrorResponse),
        (status = 403, description = "Not the session owner", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn finalize_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Json(request): Json<FinalizeUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    if let Some(container_id) = request.target_container_id {
        let session = state
            .sessions
            .get(request.upload_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Upload session not found: {}", request.upload_id))
            })?;
        if session.container_id != container_id {
            return Err(HttpAppError(AppError::InvalidRequest(format!(
                "targetContainerId {} does not match session's {}",
                container_id, session.container_id
            ))));
        }
    }

    let outcome = state.upload.finalize(user.user_id, request.upload_id).await?;

    Ok(Json(FinalizeUploadResponse {
        asset_id: outcome.asset_id,
        storage_key: outcome.storage_key,
        status: if outcome.queued {
            "QUEUED".to_string()
        } else {
            "COMPLETED".to_string()
        },
    }))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, HttpAppError> {
    field.text().await.map_err(|e| {
        HttpAppError(AppError::InvalidRequest(format!(
            "Failed to read field {}: {}",
            name, e
        )))
    })
}

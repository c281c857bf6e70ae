//! Chunk receiver and assembler.
//!
//! Chunks may arrive out of order and concurrently; receipt is recorded with
//! a single atomic store mutation per chunk, so a session can never appear
//! complete with a missing chunk or forget one that landed. Finalize is
//! exclusive: the session row is consumed before any asset is created, so of
//! two concurrent finalize calls exactly one routes the file and the other
//! observes NotFound.

use crate::error::storage_error_to_app;
use crate::services::upload::router::{IngestOutcome, IngestRequest, IngestionRouter};
use chrono::{Duration, Utc};
use lectern_core::models::{expected_chunk_count, NewUploadSession, UploadSession};
use lectern_core::AppError;
use lectern_db::{ContainerStore, SessionStore};
use lectern_storage::{keys, Storage};
use std::sync::Arc;
use uuid::Uuid;

/// Upload protocol limits, taken from configuration at startup.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub chunk_size_bytes: u64,
    pub max_upload_size_bytes: u64,
    pub session_ttl_secs: i64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
}

/// Parameters for opening an upload session.
#[derive(Debug, Clone)]
pub struct InitUpload {
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: i32,
    pub content_type: String,
    pub container_id: Uuid,
    pub secure: bool,
}

/// Progress after a chunk write: `(received, total)` lets clients resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub received: i32,
    pub total: i32,
}

/// Result of a successful finalize.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub asset_id: Uuid,
    pub storage_key: String,
    pub queued: bool,
}

#[derive(Clone)]
pub struct UploadService {
    sessions: Arc<dyn SessionStore>,
    containers: Arc<dyn ContainerStore>,
    storage: Arc<dyn Storage>,
    router: IngestionRouter,
    limits: UploadLimits,
}

impl UploadService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        containers: Arc<dyn ContainerStore>,
        storage: Arc<dyn Storage>,
        router: IngestionRouter,
        limits: UploadLimits,
    ) -> Self {
        Self {
            sessions,
            containers,
            storage,
            router,
            limits,
        }
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.limits.chunk_size_bytes
    }

    /// Validate filename extension and declared content type against the
    /// configured allowlists.
    pub fn validate_document_type(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<(), AppError> {
        let extension = keys::file_extension(filename);
        if !self.limits.allowed_extensions.contains(&extension) {
            return Err(AppError::InvalidRequest(format!(
                "File extension '{}' is not allowed",
                extension
            )));
        }
        if !self
            .limits
            .allowed_content_types
            .contains(&content_type.to_lowercase())
        {
            return Err(AppError::InvalidRequest(format!(
                "Content type '{}' is not allowed",
                content_type
            )));
        }
        Ok(())
    }

    /// Check the caller may manage the target container.
    pub async fn authorize_container(
        &self,
        user_id: Uuid,
        container_id: Uuid,
    ) -> Result<(), AppError> {
        if self.containers.get(container_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Container not found: {}",
                container_id
            )));
        }
        if !self.containers.can_manage(user_id, container_id).await? {
            return Err(AppError::Forbidden(
                "You do not have management rights on this container".to_string(),
            ));
        }
        Ok(())
    }

    /// Route an already-assembled file (the direct, non-chunked upload
    /// path). Callers validate and authorize first.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        self.router.route(request).await
    }

    /// Open an upload session: validate declared size and chunk count,
    /// authorize the caller, allocate scratch storage.
    #[tracing::instrument(skip(self, init), fields(filename = %init.filename, container_id = %init.container_id))]
    pub async fn init_upload(
        &self,
        user_id: Uuid,
        init: InitUpload,
    ) -> Result<UploadSession, AppError> {
        if init.file_size == 0 {
            return Err(AppError::InvalidRequest(
                "fileSize must be greater than 0".to_string(),
            ));
        }
        if init.file_size > self.limits.max_upload_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size {} exceeds maximum {} bytes",
                init.file_size, self.limits.max_upload_size_bytes
            )));
        }

        self.validate_document_type(&init.filename, &init.content_type)?;

        let expected =
            expected_chunk_count(init.file_size as i64, self.limits.chunk_size_bytes as i64);
        if init.total_chunks as i64 != expected {
            return Err(AppError::InvalidRequest(format!(
                "totalChunks {} does not match expected {} for {} bytes at {}-byte chunks",
                init.total_chunks, expected, init.file_size, self.limits.chunk_size_bytes
            )));
        }

        self.authorize_container(user_id, init.container_id).await?;

        let session_id = Uuid::new_v4();
        let session = NewUploadSession {
            id: session_id,
            owner_id: user_id,
            container_id: init.container_id,
            filename: init.filename,
            content_type: init.content_type,
            file_size: init.file_size as i64,
            chunk_size: self.limits.chunk_size_bytes as i64,
            total_chunks: init.total_chunks,
            secure: init.secure,
            scratch_prefix: keys::scratch_prefix(session_id),
            expires_at: Utc::now() + Duration::seconds(self.limits.session_ttl_secs),
        };
        self.sessions.create(session).await?;

        let created = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::Internal("Session vanished after create".to_string()))?;

        tracing::info!(
            session_id = %session_id,
            total_chunks = created.total_chunks,
            secure = created.secure,
            "Upload session opened"
        );

        Ok(created)
    }

    /// Receive one chunk. Idempotent per index: a re-upload overwrites the
    /// previous bytes and leaves the received count unchanged.
    #[tracing::instrument(skip(self, data))]
    pub async fn upload_chunk(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        chunk_index: i32,
        total_chunks: i32,
        data: Vec<u8>,
    ) -> Result<ChunkProgress, AppError> {
        let session = self.live_session(session_id).await?;

        if session.owner_id != user_id {
            return Err(AppError::Forbidden(
                "Only the session owner may upload chunks".to_string(),
            ));
        }
        if total_chunks != session.total_chunks {
            return Err(AppError::InvalidRequest(format!(
                "totalChunks {} does not match session's {}",
                total_chunks, session.total_chunks
            )));
        }
        if chunk_index < 0 || chunk_index >= session.total_chunks {
            return Err(AppError::InvalidRequest(format!(
                "chunkIndex {} out of range [0, {})",
                chunk_index, session.total_chunks
            )));
        }
        if data.len() as i64 > session.chunk_size {
            return Err(AppError::InvalidRequest(format!(
                "Chunk of {} bytes exceeds the {}-byte chunk ceiling",
                data.len(),
                session.chunk_size
            )));
        }
        let expected_len = session.expected_chunk_len(chunk_index);
        if data.len() as i64 != expected_len {
            return Err(AppError::InvalidRequest(format!(
                "Chunk {} must be {} bytes, got {}",
                chunk_index,
                expected_len,
                data.len()
            )));
        }

        let chunk_key = keys::scratch_chunk_key(session_id, chunk_index);
        self.storage
            .put_private(&chunk_key, data, "application/octet-stream")
            .await
            .map_err(storage_error_to_app)?;

        self.sessions
            .record_chunk(session_id, chunk_index, expected_len)
            .await?;

        let received = self.sessions.received_indices(session_id).await?.len() as i32;

        tracing::debug!(
            session_id = %session_id,
            chunk_index = chunk_index,
            received = received,
            total = session.total_chunks,
            "Chunk received"
        );

        Ok(ChunkProgress {
            received,
            total: session.total_chunks,
        })
    }

    /// Current progress for a session.
    pub async fn progress(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ChunkProgress, AppError> {
        let session = self.live_session(session_id).await?;
        if session.owner_id != user_id {
            return Err(AppError::Forbidden(
                "Only the session owner may read progress".to_string(),
            ));
        }
        let received = self.sessions.received_indices(session_id).await?.len() as i32;
        Ok(ChunkProgress {
            received,
            total: session.total_chunks,
        })
    }

    /// Assemble a complete session into one file, route it, and release
    /// scratch state.
    #[tracing::instrument(skip(self))]
    pub async fn finalize(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<FinalizeOutcome, AppError> {
        // Expiry is advisory; a present-but-expired session may still
        // finalize as long as completeness re-validates below.
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload session not found: {}", session_id)))?;

        if session.owner_id != user_id {
            return Err(AppError::Forbidden(
                "Only the session owner may finalize".to_string(),
            ));
        }

        let received = self.sessions.received_indices(session_id).await?;
        if received.len() as i32 != session.total_chunks {
            let missing = session.total_chunks - received.len() as i32;
            return Err(AppError::InvalidRequest(format!(
                "Not all chunks uploaded: {}/{} received, {} missing",
                received.len(),
                session.total_chunks,
                missing
            )));
        }

        // Concatenate strictly by ascending index. Order is the correctness
        // invariant: any gap or reorder corrupts the file silently.
        let mut assembled = Vec::with_capacity(session.file_size as usize);
        for chunk_index in 0..session.total_chunks {
            let chunk_key = keys::scratch_chunk_key(session_id, chunk_index);
            let bytes = self
                .storage
                .download(&chunk_key)
                .await
                .map_err(storage_error_to_app)?;
            assembled.extend_from_slice(&bytes);
        }

        if assembled.len() as i64 != session.file_size {
            return Err(AppError::InvalidRequest(format!(
                "Assembled size {} does not match declared size {}",
                assembled.len(),
                session.file_size
            )));
        }

        // Consume the session before creating any asset row: exactly one of
        // two concurrent finalize calls wins this delete, so duplicate
        // assets cannot exist. The loser sees NotFound.
        let session = self
            .sessions
            .consume(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload session not found: {}", session_id)))?;

        let outcome = self
            .router
            .route(IngestRequest {
                container_id: session.container_id,
                filename: session.filename.clone(),
                content_type: session.content_type.clone(),
                secure: session.secure,
                data: assembled,
            })
            .await?;

        // Best-effort scratch cleanup; the TTL sweep is the backstop.
        self.release_scratch(&session).await;

        tracing::info!(
            session_id = %session_id,
            asset_id = %outcome.asset().id,
            queued = matches!(outcome, IngestOutcome::Queued { .. }),
            "Upload finalized"
        );

        Ok(FinalizeOutcome {
            asset_id: outcome.asset().id,
            storage_key: outcome.asset().storage_key.clone(),
            queued: matches!(outcome, IngestOutcome::Queued { .. }),
        })
    }

    /// Delete a session's scratch chunk slots. Failures are logged, never
    /// escalated.
    pub async fn release_scratch(&self, session: &UploadSession) {
        for chunk_index in 0..session.total_chunks {
            let chunk_key = keys::scratch_chunk_key(session.id, chunk_index);
            if let Err(e) = self.storage.delete(&chunk_key).await {
                tracing::warn!(
                    error = %e,
                    storage_key = %chunk_key,
                    "Failed to delete chunk during cleanup"
                );
            }
        }
    }

    /// Sweep expired sessions: consume each and release its scratch space.
    /// Runs on an interval; finalize never depends on it for correctness.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let expired = self.sessions.expired(Utc::now()).await?;
        let mut swept = 0u64;
        for session in expired {
            // Consume first so a concurrent finalize cannot assemble from
            // half-deleted scratch state.
            if let Some(session) = self.sessions.consume(session.id).await? {
                self.release_scratch(&session).await;
                swept += 1;
                tracing::info!(session_id = %session.id, "Expired upload session swept");
            }
        }
        Ok(swept)
    }

    /// A session that exists and has not expired. Expired sessions are
    /// indistinguishable from missing ones for the chunk protocol.
    async fn live_session(&self, session_id: Uuid) -> Result<UploadSession, AppError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload session not found: {}", session_id)))?;
        if session.is_expired(Utc::now()) {
            return Err(AppError::NotFound(format!(
                "Upload session not found: {}",
                session_id
            )));
        }
        Ok(session)
    }
}

//! Ingestion routing: direct-publish vs. the secure render pipeline.
//!
//! Direct-publish requires both an already-canonical source and an explicit
//! request for no security wrapping. Everything else is forced onto the
//! secure path: a non-canonical format must be normalized and watermarked
//! before any distribution, regardless of what the caller asked for.

use crate::error::storage_error_to_app;
use lectern_core::models::{
    Asset, AssetKind, NewAsset, RenderJobPayload, RenderStatus, RENDER_DOCUMENT_JOB,
};
use lectern_core::AppError;
use lectern_db::AssetStore;
use lectern_processing::format::{
    is_canonical_content_type, pdf_page_count, sniff_format, SourceFormat,
};
use lectern_storage::{keys, Storage};
use lectern_worker::RenderQueue;
use std::sync::Arc;
use uuid::Uuid;

/// An assembled (or directly uploaded) file ready for routing.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub container_id: Uuid,
    pub filename: String,
    pub content_type: String,
    /// Caller's security request. Non-canonical sources are secured even
    /// when this is false.
    pub secure: bool,
    pub data: Vec<u8>,
}

/// Result of routing one assembled file.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Direct-publish path: the asset is live immediately.
    Published { asset: Asset, url: String },
    /// Secure path: the asset is PROCESSING and a render job is queued.
    Queued { asset: Asset, job_id: Uuid },
}

impl IngestOutcome {
    pub fn asset(&self) -> &Asset {
        match self {
            IngestOutcome::Published { asset, .. } => asset,
            IngestOutcome::Queued { asset, .. } => asset,
        }
    }
}

#[derive(Clone)]
pub struct IngestionRouter {
    assets: Arc<dyn AssetStore>,
    storage: Arc<dyn Storage>,
    queue: RenderQueue,
}

impl IngestionRouter {
    pub fn new(assets: Arc<dyn AssetStore>, storage: Arc<dyn Storage>, queue: RenderQueue) -> Self {
        Self {
            assets,
            storage,
            queue,
        }
    }

    /// Whether a request qualifies for direct publishing. Both the declared
    /// type and the actual bytes must be canonical; a mislabeled office file
    /// is still forced through normalization.
    fn is_direct_publishable(request: &IngestRequest) -> bool {
        !request.secure
            && is_canonical_content_type(&request.content_type)
            && sniff_format(&request.data) == SourceFormat::Pdf
    }

    #[tracing::instrument(skip(self, request), fields(container_id = %request.container_id, filename = %request.filename))]
    pub async fn route(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        if Self::is_direct_publishable(&request) {
            self.publish_direct(request).await
        } else {
            self.enter_secure_path(request).await
        }
    }

    async fn publish_direct(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        let file_id = Uuid::new_v4();
        let extension = keys::file_extension(&request.filename);
        let storage_key = keys::public_document_key(file_id, &extension);

        let url = self
            .storage
            .put_public(&storage_key, request.data.clone(), &request.content_type)
            .await
            .map_err(storage_error_to_app)?;

        let page_count = pdf_page_count(&request.data);

        let asset = self
            .assets
            .create(NewAsset {
                container_id: request.container_id,
                title: request.filename.clone(),
                kind: AssetKind::Document,
                storage_key: storage_key.clone(),
                render_status: RenderStatus::Completed,
                is_secure: false,
                page_count,
            })
            .await?;

        tracing::info!(
            asset_id = %asset.id,
            storage_key = %storage_key,
            "Document published directly"
        );

        Ok(IngestOutcome::Published { asset, url })
    }

    async fn enter_secure_path(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        let asset = self
            .assets
            .create(NewAsset {
                container_id: request.container_id,
                title: request.filename.clone(),
                kind: AssetKind::Document,
                storage_key: String::new(),
                render_status: RenderStatus::Processing,
                is_secure: true,
                page_count: 0,
            })
            .await?;

        let extension = keys::file_extension(&request.filename);
        let source_key = keys::staging_key(asset.id, &extension);

        if let Err(e) = self
            .storage
            .put_private(&source_key, request.data, &request.content_type)
            .await
        {
            // The asset row exists but has no stageable source; record the
            // failure so it does not sit in PROCESSING forever.
            if let Err(mark_err) = self.assets.mark_failed(asset.id, "UPLOAD_FAILED").await {
                tracing::error!(
                    error = %mark_err,
                    asset_id = %asset.id,
                    "Failed to record staging failure on asset"
                );
            }
            return Err(storage_error_to_app(e));
        }

        let payload = RenderJobPayload {
            source_key: source_key.clone(),
            content_type: request.content_type,
            original_filename: request.filename,
            asset_id: asset.id,
            brand_label: None,
        };

        let job_id = self
            .queue
            .submit(RENDER_DOCUMENT_JOB, &payload)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to enqueue render job: {}", e)))?;

        tracing::info!(
            asset_id = %asset.id,
            job_id = %job_id,
            source_key = %source_key,
            "Document staged for rendering"
        );

        Ok(IngestOutcome::Queued { asset, job_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_db::test_helpers::{MemoryAssetStore, MemoryRenderJobs};
    use lectern_db::RenderJobStore;
    use lectern_storage::MemoryStorage;
    use lectern_worker::RenderQueueConfig;

    fn router_with_fakes() -> (IngestionRouter, Arc<MemoryAssetStore>, Arc<MemoryRenderJobs>, MemoryStorage) {
        let assets = Arc::new(MemoryAssetStore::new());
        let jobs = Arc::new(MemoryRenderJobs::new());
        let storage = MemoryStorage::new();
        let job_store: Arc<dyn RenderJobStore> = jobs.clone();
        let queue = RenderQueue::new_no_worker(job_store, RenderQueueConfig::default());
        let router = IngestionRouter::new(
            assets.clone(),
            Arc::new(storage.clone()),
            queue,
        );
        (router, assets, jobs, storage)
    }

    fn pdf_request(secure: bool) -> IngestRequest {
        IngestRequest {
            container_id: Uuid::new_v4(),
            filename: "syllabus.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            secure,
            data: b"%PDF-1.4\nminimal".to_vec(),
        }
    }

    fn docx_request(secure: bool) -> IngestRequest {
        IngestRequest {
            container_id: Uuid::new_v4(),
            filename: "lecture.docx".to_string(),
            content_type:
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            secure,
            data: b"PK\x03\x04not really".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_non_secure_pdf_publishes_directly() {
        let (router, assets, jobs, _storage) = router_with_fakes();
        let outcome = router.route(pdf_request(false)).await.unwrap();

        match outcome {
            IngestOutcome::Published { asset, url } => {
                assert_eq!(asset.render_status, RenderStatus::Completed);
                assert!(!asset.is_secure);
                assert!(!asset.storage_key.is_empty());
                assert!(url.contains("documents/"));
            }
            IngestOutcome::Queued { .. } => panic!("expected direct publish"),
        }
        assert_eq!(assets.asset_count(), 1);
        assert_eq!(jobs.job_count(), 0);
    }

    #[tokio::test]
    async fn test_secure_pdf_enters_render_pipeline() {
        let (router, _assets, jobs, storage) = router_with_fakes();
        let outcome = router.route(pdf_request(true)).await.unwrap();

        match outcome {
            IngestOutcome::Queued { asset, .. } => {
                assert_eq!(asset.render_status, RenderStatus::Processing);
                assert!(asset.is_secure);
                assert!(asset.storage_key.is_empty());
                assert_eq!(asset.page_count, 0);
            }
            IngestOutcome::Published { .. } => panic!("expected secure path"),
        }
        assert_eq!(jobs.job_count(), 1);
        // Source is staged privately, nothing public
        assert!(storage.keys().iter().all(|k| k.starts_with("staging/")));
    }

    #[tokio::test]
    async fn test_docx_is_forced_secure_even_when_caller_opts_out() {
        let (router, _assets, jobs, _storage) = router_with_fakes();
        let outcome = router.route(docx_request(false)).await.unwrap();

        match outcome {
            IngestOutcome::Queued { asset, .. } => {
                assert_eq!(asset.render_status, RenderStatus::Processing);
                assert!(asset.is_secure);
            }
            IngestOutcome::Published { .. } => panic!("non-canonical source must be secured"),
        }
        assert_eq!(jobs.job_count(), 1);
    }

    #[tokio::test]
    async fn test_mislabeled_pdf_is_forced_secure() {
        // Declared as PDF but the bytes are a ZIP container.
        let (router, _assets, jobs, _storage) = router_with_fakes();
        let mut request = docx_request(false);
        request.content_type = "application/pdf".to_string();

        let outcome = router.route(request).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Queued { .. }));
        assert_eq!(jobs.job_count(), 1);
    }

    #[tokio::test]
    async fn test_queued_job_payload_points_at_staged_source() {
        let (router, _assets, jobs, storage) = router_with_fakes();
        let outcome = router.route(docx_request(true)).await.unwrap();

        let job = &jobs.all()[0];
        let payload: RenderJobPayload = job.try_payload_as().unwrap();
        assert_eq!(payload.asset_id, outcome.asset().id);
        assert!(storage.keys().contains(&payload.source_key));
        assert_eq!(payload.original_filename, "lecture.docx");
    }
}

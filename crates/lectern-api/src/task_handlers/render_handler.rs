//! Document render pipeline: download staged source, normalize to PDF,
//! watermark every page, persist to private storage, update the asset.
//!
//! The pipeline is a straight PROCESSING → COMPLETED / FAILED state machine
//! with no internal retry. Each step reports its own failure code; the
//! top-level `run` catches any of them once, marks the asset FAILED
//! (best-effort) and re-raises so the queue's failure bookkeeping fires.
//! Redelivery is safe end to end: the output key is deterministic per asset,
//! so reprocessing overwrites the previous render with an equivalent one.

use crate::error::storage_error_to_app;
use lectern_core::constants::CANONICAL_EXTENSION;
use lectern_core::models::RenderJobPayload;
use lectern_core::AppError;
use lectern_db::AssetStore;
use lectern_processing::{stamp_pdf, DocumentConverter, WatermarkSpec};
use lectern_storage::{keys, Storage, StorageError};
use serde_json::json;
use std::sync::Arc;

/// Rewrite a source filename to the canonical document extension for display.
pub fn normalize_display_name(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{}.{}", stem, CANONICAL_EXTENSION),
        _ => format!("{}.{}", filename, CANONICAL_EXTENSION),
    }
}

#[derive(Clone)]
pub struct RenderJobHandler {
    assets: Arc<dyn AssetStore>,
    storage: Arc<dyn Storage>,
    converter: Arc<dyn DocumentConverter>,
    watermark: WatermarkSpec,
}

impl RenderJobHandler {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        storage: Arc<dyn Storage>,
        converter: Arc<dyn DocumentConverter>,
        watermark: WatermarkSpec,
    ) -> Self {
        Self {
            assets,
            storage,
            converter,
            watermark,
        }
    }

    /// Process one render job. On any pipeline failure the asset is marked
    /// FAILED (best-effort) and the error is re-raised for the queue.
    pub async fn run(&self, payload: &RenderJobPayload) -> Result<serde_json::Value, AppError> {
        match self.render(payload).await {
            Ok(result) => Ok(result),
            Err(error) => {
                let code = error.render_failure_code();
                if let Err(mark_err) = self.assets.mark_failed(payload.asset_id, code).await {
                    tracing::error!(
                        error = %mark_err,
                        asset_id = %payload.asset_id,
                        "Failed to mark asset FAILED after render error"
                    );
                }
                tracing::error!(
                    error = %error,
                    failure_code = code,
                    asset_id = %payload.asset_id,
                    source_key = %payload.source_key,
                    "Render pipeline failed"
                );
                Err(error)
            }
        }
    }

    async fn render(&self, payload: &RenderJobPayload) -> Result<serde_json::Value, AppError> {
        let asset_id = payload.asset_id;

        // 1. Confirm the asset is (back) in PROCESSING.
        self.assets.mark_processing(asset_id).await?;

        // 2. Download the staged source.
        let source = self
            .storage
            .download(&payload.source_key)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(key) => {
                    AppError::SourceNotFound(format!("Staged source missing: {}", key))
                }
                other => AppError::SourceNotFound(other.to_string()),
            })?;

        // 3. Normalize to the canonical format. PDF passes through unchanged.
        let normalized = self
            .converter
            .to_pdf(source, &payload.original_filename)
            .await?;

        // 4–5. Stamp every page and serialize.
        let mut spec = self.watermark.clone();
        if let Some(label) = &payload.brand_label {
            spec.brand_label = label.clone();
        }
        let stamped = stamp_pdf(&normalized, &spec)?;

        // 6. Persist under the deterministic per-asset key.
        let output_key = keys::rendered_key(asset_id);
        self.storage
            .put_private(
                &output_key,
                stamped.bytes,
                lectern_core::constants::CANONICAL_CONTENT_TYPE,
            )
            .await
            .map_err(|e| AppError::UploadFailed(e.to_string()))?;

        // 7. Update the asset record. This still throws on failure even
        // though the upload already succeeded; replay overwrites the same key.
        let display_name = normalize_display_name(&payload.original_filename);
        self.assets
            .mark_completed(
                asset_id,
                &output_key,
                &display_name,
                stamped.page_count as i32,
            )
            .await
            .map_err(|e| AppError::DbUpdateFailed(e.to_string()))?;

        // 8. Best-effort cleanup of the staged source.
        if let Err(e) = self.storage.delete(&payload.source_key).await {
            tracing::warn!(
                error = %storage_error_to_app(e),
                source_key = %payload.source_key,
                "Failed to delete staged source after render"
            );
        }

        tracing::info!(
            asset_id = %asset_id,
            storage_key = %output_key,
            page_count = stamped.page_count,
            "Document rendered and watermarked"
        );

        Ok(json!({
            "asset_id": asset_id,
            "storage_key": output_key,
            "page_count": stamped.page_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::models::{AssetKind, NewAsset, RenderStatus};
    use lectern_db::test_helpers::MemoryAssetStore;
    use lectern_processing::SofficeConverter;
    use lectern_storage::MemoryStorage;
    use std::time::Duration;
    use uuid::Uuid;

    fn handler_with_fakes() -> (RenderJobHandler, Arc<MemoryAssetStore>, MemoryStorage) {
        let assets = Arc::new(MemoryAssetStore::new());
        let storage = MemoryStorage::new();
        // PDF sources pass through the converter untouched, so the binary
        // path is never exercised here.
        let converter = Arc::new(SofficeConverter::new(
            "soffice-not-installed",
            Duration::from_secs(1),
        ));
        let handler = RenderJobHandler::new(
            assets.clone(),
            Arc::new(storage.clone()),
            converter,
            WatermarkSpec::new("Lectern", "support@lectern.example.com"),
        );
        (handler, assets, storage)
    }

    async fn processing_asset(assets: &MemoryAssetStore) -> Uuid {
        assets
            .create(NewAsset {
                container_id: Uuid::new_v4(),
                title: "lecture.pdf".to_string(),
                kind: AssetKind::Document,
                storage_key: String::new(),
                render_status: RenderStatus::Processing,
                is_secure: true,
                page_count: 0,
            })
            .await
            .unwrap()
            .id
    }

    fn sample_pdf() -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
                Operation::new("Td", vec![Object::Real(72.0), Object::Real(720.0)]),
                Operation::new("Tj", vec![Object::string_literal("Body")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => Object::Reference(font_id) } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog", "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn payload(asset_id: Uuid, source_key: &str) -> RenderJobPayload {
        RenderJobPayload {
            source_key: source_key.to_string(),
            content_type: "application/pdf".to_string(),
            original_filename: "lecture.pdf".to_string(),
            asset_id,
            brand_label: None,
        }
    }

    #[tokio::test]
    async fn test_happy_path_completes_asset() {
        let (handler, assets, storage) = handler_with_fakes();
        let asset_id = processing_asset(&assets).await;
        let source_key = keys::staging_key(asset_id, "pdf");
        storage
            .put_private(&source_key, sample_pdf(), "application/pdf")
            .await
            .unwrap();

        let result = handler.run(&payload(asset_id, &source_key)).await.unwrap();

        let asset = assets.get(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.render_status, RenderStatus::Completed);
        assert_eq!(asset.storage_key, keys::rendered_key(asset_id));
        assert_eq!(asset.page_count, 1);
        assert_eq!(asset.display_name.as_deref(), Some("lecture.pdf"));
        assert_eq!(result["page_count"], 1);

        // Staged source cleaned up, rendered output present.
        assert!(!storage.exists(&source_key).await.unwrap());
        assert!(storage.exists(&keys::rendered_key(asset_id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_marks_asset_failed() {
        let (handler, assets, _storage) = handler_with_fakes();
        let asset_id = processing_asset(&assets).await;

        let result = handler
            .run(&payload(asset_id, "staging/nowhere/source.pdf"))
            .await;

        assert!(matches!(result, Err(AppError::SourceNotFound(_))));
        let asset = assets.get(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.render_status, RenderStatus::Failed);
        assert_eq!(asset.failure_code.as_deref(), Some("SOURCE_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_unparseable_source_marks_asset_failed() {
        let (handler, assets, storage) = handler_with_fakes();
        let asset_id = processing_asset(&assets).await;
        let source_key = keys::staging_key(asset_id, "pdf");
        // Sniffs as PDF so it passes conversion untouched, but cannot be
        // loaded for stamping.
        storage
            .put_private(&source_key, b"%PDF-1.4 garbage".to_vec(), "application/pdf")
            .await
            .unwrap();

        let result = handler.run(&payload(asset_id, &source_key)).await;

        assert!(result.is_err());
        let asset = assets.get(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.render_status, RenderStatus::Failed);
    }

    #[tokio::test]
    async fn test_redelivery_after_completion_is_idempotent() {
        let (handler, assets, storage) = handler_with_fakes();
        let asset_id = processing_asset(&assets).await;
        let source_key = keys::staging_key(asset_id, "pdf");
        storage
            .put_private(&source_key, sample_pdf(), "application/pdf")
            .await
            .unwrap();

        handler.run(&payload(asset_id, &source_key)).await.unwrap();

        // The queue redelivers the same job; the staged source was already
        // cleaned up, so re-stage it the way a crashed-before-ack delivery
        // would still find it.
        storage
            .put_private(&source_key, sample_pdf(), "application/pdf")
            .await
            .unwrap();
        handler.run(&payload(asset_id, &source_key)).await.unwrap();

        let asset = assets.get(asset_id).await.unwrap().unwrap();
        assert_eq!(asset.render_status, RenderStatus::Completed);
        assert_eq!(asset.storage_key, keys::rendered_key(asset_id));
        assert_eq!(asset.page_count, 1);
    }

    #[tokio::test]
    async fn test_brand_label_override_is_applied() {
        let (handler, assets, storage) = handler_with_fakes();
        let asset_id = processing_asset(&assets).await;
        let source_key = keys::staging_key(asset_id, "pdf");
        storage
            .put_private(&source_key, sample_pdf(), "application/pdf")
            .await
            .unwrap();

        let mut payload = payload(asset_id, &source_key);
        payload.brand_label = Some("Night School".to_string());
        handler.run(&payload).await.unwrap();

        let rendered = storage
            .download(&keys::rendered_key(asset_id))
            .await
            .unwrap();
        let doc = lopdf::Document::load_mem(&rendered).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("Night School"));
    }

    #[test]
    fn test_normalize_display_name() {
        assert_eq!(normalize_display_name("Lecture 3.docx"), "Lecture 3.pdf");
        assert_eq!(normalize_display_name("slides.PPTX"), "slides.pdf");
        assert_eq!(normalize_display_name("noextension"), "noextension.pdf");
        assert_eq!(normalize_display_name(".hidden"), ".hidden.pdf");
    }
}

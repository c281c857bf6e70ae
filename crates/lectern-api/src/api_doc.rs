//! OpenAPI documentation aggregation.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::uploads::init_upload,
        crate::handlers::uploads::upload_chunk,
        crate::handlers::uploads::upload_progress,
        crate::handlers::uploads::finalize_upload,
        crate::handlers::documents::upload_document,
        crate::handlers::documents::get_document,
        crate::handlers::documents::get_document_content,
        crate::handlers::documents::replay_render,
    ),
    components(schemas(
        crate::handlers::uploads::InitUploadRequest,
        crate::handlers::uploads::InitUploadResponse,
        crate::handlers::uploads::ChunkProgressResponse,
        crate::handlers::uploads::FinalizeUploadRequest,
        crate::handlers::uploads::FinalizeUploadResponse,
        crate::handlers::documents::QueuedResponse,
        crate::handlers::documents::PublishedResponse,
        crate::error::ErrorResponse,
        lectern_core::models::AssetResponse,
    )),
    tags(
        (name = "uploads", description = "Resumable chunked upload protocol"),
        (name = "documents", description = "Document assets and rendering")
    )
)]
pub struct ApiDoc;

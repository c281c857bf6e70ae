//! Route configuration and setup.

use crate::api_doc::ApiDoc;
use crate::handlers::{documents, uploads};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lectern_core::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    // Chunk posts carry one chunk plus multipart framing; leave headroom.
    let body_limit = (config.chunk_size_bytes as usize)
        .max(config.max_upload_size_bytes as usize)
        + 64 * 1024;

    let router = Router::new()
        .route("/api/v0/uploads/init", post(uploads::init_upload))
        .route("/api/v0/uploads/chunk", post(uploads::upload_chunk))
        .route("/api/v0/uploads/{upload_id}", get(uploads::upload_progress))
        .route("/api/v0/uploads/finalize", post(uploads::finalize_upload))
        .route(
            "/api/v0/containers/{container_id}/documents",
            post(documents::upload_document),
        )
        .route("/api/v0/documents/{asset_id}", get(documents::get_document))
        .route(
            "/api/v0/documents/{asset_id}/content",
            get(documents::get_document_content),
        )
        .route(
            "/api/v0/documents/{asset_id}/replay",
            post(documents::replay_render),
        )
        .route("/health", get(health))
        .route("/api/v0/openapi.json", get(openapi_json))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
    };
    Ok(cors)
}

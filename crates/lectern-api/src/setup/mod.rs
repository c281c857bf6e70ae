//! Application initialization: database, storage, stores, state, routes.

pub mod database;
pub mod routes;
pub mod server;
pub mod sweeper;

use crate::services::upload::{IngestionRouter, UploadLimits, UploadService};
use crate::state::AppState;
use crate::task_handlers::RenderJobHandler;
use anyhow::{Context, Result};
use axum::Router;
use lectern_core::Config;
use lectern_db::{
    AssetRepository, AssetStore, ContainerRepository, ContainerStore, RenderJobRepository,
    RenderJobStore, SessionRepository, SessionStore,
};
use lectern_processing::{DocumentConverter, SofficeConverter, WatermarkSpec};
use lectern_worker::{RenderDispatch, RenderQueue, RenderQueueConfig};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Build everything the server needs: pool, storage, stores, queue, state,
/// and the axum router. The queue is wired to the state through
/// `Arc::new_cyclic` because the state owns the queue while the queue's
/// worker pool dispatches back into the state.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, Router)> {
    let pool = database::setup_database(&config).await?;

    let storage = lectern_storage::create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;

    let sessions: Arc<dyn SessionStore> = Arc::new(SessionRepository::new(pool.clone()));
    let assets: Arc<dyn AssetStore> = Arc::new(AssetRepository::new(pool.clone()));
    let containers: Arc<dyn ContainerStore> = Arc::new(ContainerRepository::new(pool.clone()));
    let jobs: Arc<dyn RenderJobStore> = Arc::new(RenderJobRepository::new(pool.clone()));

    let converter: Arc<dyn DocumentConverter> = Arc::new(SofficeConverter::new(
        config.soffice_path.clone(),
        Duration::from_secs(config.convert_timeout_secs),
    ));

    let watermark = WatermarkSpec::new(
        config.watermark_brand_label.clone(),
        config.watermark_contact_label.clone(),
    );

    let queue_config = RenderQueueConfig {
        max_workers: config.render_queue_max_workers,
        poll_interval_ms: config.render_queue_poll_interval_ms,
        job_timeout_seconds: config.render_job_timeout_seconds,
        stale_job_reap_interval_secs: config.stale_job_reap_interval_secs,
        stale_job_grace_period_secs: config.stale_job_grace_period_secs,
    };

    let limits = UploadLimits {
        chunk_size_bytes: config.chunk_size_bytes,
        max_upload_size_bytes: config.max_upload_size_bytes,
        session_ttl_secs: config.session_ttl_secs,
        allowed_extensions: config.document_allowed_extensions.clone(),
        allowed_content_types: config.document_allowed_content_types.clone(),
    };

    let state = Arc::new_cyclic(|weak: &Weak<AppState>| {
        let dispatch: Weak<dyn RenderDispatch> = weak.clone();
        let queue = RenderQueue::new(
            jobs.clone(),
            queue_config,
            dispatch,
            Some(pool.clone()),
        );

        let router = IngestionRouter::new(assets.clone(), storage.clone(), queue.clone());
        let upload = UploadService::new(
            sessions.clone(),
            containers.clone(),
            storage.clone(),
            router,
            limits,
        );

        let render_handler = RenderJobHandler::new(
            assets.clone(),
            storage.clone(),
            converter.clone(),
            watermark.clone(),
        );

        AppState {
            config: config.clone(),
            sessions: sessions.clone(),
            assets: assets.clone(),
            containers: containers.clone(),
            storage: storage.clone(),
            upload,
            queue,
            render_handler,
        }
    });

    // Session TTL sweep; the sender is held by the state's lifetime via the
    // runtime, and the loop ends on process shutdown.
    let _sweeper = sweeper::spawn_session_sweeper(
        state.upload.clone(),
        config.session_sweep_interval_secs,
    );

    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}

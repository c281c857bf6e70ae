//! Application state.
//!
//! One `AppState` holds the stores, storage backend, upload service, and the
//! render queue handle. It also implements [`RenderDispatch`], so the queue's
//! worker pool routes claimed jobs back into [`RenderJobHandler`]; the queue
//! holds only a `Weak` reference, which is why construction goes through
//! `Arc::new_cyclic` in setup.

use anyhow::Result;
use async_trait::async_trait;
use lectern_core::models::{RenderJob, RenderJobPayload, RENDER_DOCUMENT_JOB};
use lectern_core::Config;
use lectern_db::{AssetStore, ContainerStore, SessionStore};
use lectern_storage::Storage;
use lectern_worker::{RenderDispatch, RenderQueue};
use std::sync::Arc;

use crate::services::upload::UploadService;
use crate::task_handlers::RenderJobHandler;

pub struct AppState {
    pub config: Config,
    pub sessions: Arc<dyn SessionStore>,
    pub assets: Arc<dyn AssetStore>,
    pub containers: Arc<dyn ContainerStore>,
    pub storage: Arc<dyn Storage>,
    pub upload: UploadService,
    pub queue: RenderQueue,
    pub render_handler: RenderJobHandler,
}

#[async_trait]
impl RenderDispatch for AppState {
    async fn dispatch_job(self: Arc<Self>, job: &RenderJob) -> Result<serde_json::Value> {
        match job.job_name.as_str() {
            RENDER_DOCUMENT_JOB => {
                let payload: RenderJobPayload = job
                    .try_payload_as()
                    .map_err(|e| anyhow::anyhow!("Malformed render job payload: {}", e))?;
                let result = self.render_handler.run(&payload).await?;
                Ok(result)
            }
            other => Err(anyhow::anyhow!("Unknown job name: {}", other)),
        }
    }
}

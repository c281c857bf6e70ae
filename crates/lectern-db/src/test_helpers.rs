//! In-memory store implementations for tests.
//!
//! These mirror the Postgres repositories' semantics closely enough to
//! exercise the upload and render services without a database: consume is
//! atomic under the store lock, chunk recording is an upsert, asset status
//! writes are idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{
    Asset, Container, JobStatus, NewAsset, NewUploadSession, RenderJob, UploadSession,
};
use lectern_core::AppError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::asset::AssetStore;
use crate::container::ContainerStore;
use crate::render_job::RenderJobStore;
use crate::session::SessionStore;

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, UploadSession>>>,
    chunks: Arc<Mutex<HashMap<Uuid, BTreeMap<i32, i64>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewUploadSession) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id) {
            return Err(AppError::Internal(format!(
                "Session already exists: {}",
                session.id
            )));
        }
        sessions.insert(
            session.id,
            UploadSession {
                id: session.id,
                owner_id: session.owner_id,
                container_id: session.container_id,
                filename: session.filename,
                content_type: session.content_type,
                file_size: session.file_size,
                chunk_size: session.chunk_size,
                total_chunks: session.total_chunks,
                secure: session.secure,
                scratch_prefix: session.scratch_prefix,
                expires_at: session.expires_at,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        Ok(self.sessions.lock().unwrap().get(&session_id).cloned())
    }

    async fn record_chunk(
        &self,
        session_id: Uuid,
        chunk_index: i32,
        size: i64,
    ) -> Result<(), AppError> {
        self.chunks
            .lock()
            .unwrap()
            .entry(session_id)
            .or_default()
            .insert(chunk_index, size);
        Ok(())
    }

    async fn received_indices(&self, session_id: Uuid) -> Result<Vec<i32>, AppError> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .get(&session_id)
            .map(|set| set.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn consume(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let removed = self.sessions.lock().unwrap().remove(&session_id);
        if removed.is_some() {
            self.chunks.lock().unwrap().remove(&session_id);
        }
        Ok(removed)
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.expires_at < now)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    assets: Arc<Mutex<HashMap<Uuid, Asset>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Asset> {
        self.assets.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError> {
        let mut assets = self.assets.lock().unwrap();
        let position = assets
            .values()
            .filter(|a| a.container_id == asset.container_id)
            .map(|a| a.position + 1)
            .max()
            .unwrap_or(0);
        let created = Asset {
            id: Uuid::new_v4(),
            container_id: asset.container_id,
            title: asset.title,
            display_name: None,
            kind: asset.kind,
            storage_key: asset.storage_key,
            render_status: asset.render_status,
            is_secure: asset.is_secure,
            page_count: asset.page_count,
            position,
            failure_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assets.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, asset_id: Uuid) -> Result<Option<Asset>, AppError> {
        Ok(self.assets.lock().unwrap().get(&asset_id).cloned())
    }

    async fn mark_processing(&self, asset_id: Uuid) -> Result<(), AppError> {
        let mut assets = self.assets.lock().unwrap();
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;
        asset.render_status = lectern_core::models::RenderStatus::Processing;
        asset.storage_key = String::new();
        asset.page_count = 0;
        asset.failure_code = None;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_completed(
        &self,
        asset_id: Uuid,
        storage_key: &str,
        display_name: &str,
        page_count: i32,
    ) -> Result<(), AppError> {
        let mut assets = self.assets.lock().unwrap();
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;
        asset.render_status = lectern_core::models::RenderStatus::Completed;
        asset.storage_key = storage_key.to_string();
        asset.display_name = Some(display_name.to_string());
        asset.page_count = page_count;
        asset.failure_code = None;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, asset_id: Uuid, failure_code: &str) -> Result<(), AppError> {
        let mut assets = self.assets.lock().unwrap();
        let asset = assets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("Asset not found: {}", asset_id)))?;
        asset.render_status = lectern_core::models::RenderStatus::Failed;
        asset.storage_key = String::new();
        asset.page_count = 0;
        asset.failure_code = Some(failure_code.to_string());
        asset.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryRenderJobs {
    jobs: Arc<Mutex<Vec<RenderJob>>>,
}

impl MemoryRenderJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<RenderJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderJobStore for MemoryRenderJobs {
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let job = RenderJob {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            status: JobStatus::Pending,
            payload,
            result: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<RenderJob>, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                return Ok(Some(job.clone()));
            }
        }
        Ok(None)
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: serde_json::Value) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Failed;
            job.result = Some(error);
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn reap_stale_running(
        &self,
        _timeout_secs: i64,
        _grace_secs: i64,
    ) -> Result<u64, AppError> {
        Ok(0)
    }
}

#[derive(Clone, Default)]
pub struct MemoryContainers {
    containers: Arc<Mutex<HashMap<Uuid, Container>>>,
    managers: Arc<Mutex<HashSet<(Uuid, Uuid)>>>,
}

impl MemoryContainers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a container owned by `owner_id` and return its id.
    pub fn add_container(&self, owner_id: Uuid) -> Uuid {
        let container = Container {
            id: Uuid::new_v4(),
            owner_id,
            title: "Test container".to_string(),
            created_at: Utc::now(),
        };
        let id = container.id;
        self.containers.lock().unwrap().insert(id, container);
        id
    }

    /// Grant `user_id` management rights on `container_id`.
    pub fn add_manager(&self, container_id: Uuid, user_id: Uuid) {
        self.managers.lock().unwrap().insert((container_id, user_id));
    }
}

#[async_trait]
impl ContainerStore for MemoryContainers {
    async fn get(&self, container_id: Uuid) -> Result<Option<Container>, AppError> {
        Ok(self.containers.lock().unwrap().get(&container_id).cloned())
    }

    async fn can_manage(&self, user_id: Uuid, container_id: Uuid) -> Result<bool, AppError> {
        let owns = self
            .containers
            .lock()
            .unwrap()
            .get(&container_id)
            .map(|c| c.owner_id == user_id)
            .unwrap_or(false);
        Ok(owns
            || self
                .managers
                .lock()
                .unwrap()
                .contains(&(container_id, user_id)))
    }
}

//! Render queue consumer: worker pool, LISTEN/NOTIFY or polling, and the
//! stale-job reaper.
//!
//! Delivery is at-least-once: a worker that crashes mid-job leaves the job
//! `running` until the reaper returns it to `pending` for redelivery. A job
//! whose handler *returns an error* is marked failed immediately and is not
//! retried; recovery from handler failures is an explicit operator replay.
//!
//! Shutdown: [`RenderQueue::shutdown`] signals the pool to stop claiming; it
//! does not wait for in-flight jobs. For graceful shutdown, coordinate with
//! your runtime and allow time for running jobs to finish before process exit.

use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use lectern_core::models::{RenderJob, RenderJobPayload};
use lectern_db::{RenderJobStore, RENDER_JOB_NOTIFY_CHANNEL};

use crate::context::RenderDispatch;

#[derive(Clone)]
pub struct RenderQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: i32,
    /// Interval in seconds between runs of the stale job reaper. 0 = disabled.
    pub stale_job_reap_interval_secs: u64,
    /// Grace period in seconds added to the job timeout before reaping stale running jobs.
    pub stale_job_grace_period_secs: i64,
}

impl Default for RenderQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            job_timeout_seconds: 600,
            stale_job_reap_interval_secs: 60,
            stale_job_grace_period_secs: 300,
        }
    }
}

pub struct RenderQueue {
    store: Arc<dyn RenderJobStore>,
    config: RenderQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl RenderQueue {
    /// Create a new RenderQueue with a weak reference to the dispatch context.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake
    /// immediately when jobs are enqueued, in addition to polling at
    /// `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        store: Arc<dyn RenderJobStore>,
        config: RenderQueueConfig,
        context: Weak<dyn RenderDispatch>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let store_clone = store.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(store_clone, config_clone, context, shutdown_rx, pool).await;
        });

        Self {
            store,
            config,
            shutdown_tx,
        }
    }

    /// Creates a RenderQueue that does not spawn a worker.
    /// Jobs submitted here are written to the database and picked up by a
    /// real worker elsewhere.
    pub fn new_no_worker(store: Arc<dyn RenderJobStore>, config: RenderQueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            store,
            config,
            shutdown_tx,
        }
    }

    /// Submit a render job to the queue.
    #[tracing::instrument(skip(self, payload), fields(asset_id = %payload.asset_id))]
    pub async fn submit(
        &self,
        job_name: &str,
        payload: &RenderJobPayload,
    ) -> Result<uuid::Uuid, anyhow::Error> {
        let job_id = self
            .store
            .enqueue(job_name, payload.to_value())
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    job_name = %job_name,
                    asset_id = %payload.asset_id,
                    "Failed to enqueue render job"
                );
                anyhow::anyhow!("Failed to enqueue render job: {}", e)
            })?;

        tracing::info!(
            job_id = %job_id,
            job_name = %job_name,
            source_key = %payload.source_key,
            "Render job submitted"
        );

        Ok(job_id)
    }

    async fn worker_pool(
        store: Arc<dyn RenderJobStore>,
        config: RenderQueueConfig,
        context: Weak<dyn RenderDispatch>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Render queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(RENDER_JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Spawn stale job reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_job_reap_interval_secs > 0 {
            let store_for_reaper = store.clone();
            let reap_interval = Duration::from_secs(config.stale_job_reap_interval_secs);
            let timeout_secs = config.job_timeout_seconds as i64;
            let grace_period = config.stale_job_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = store_for_reaper
                                .reap_stale_running(timeout_secs, grace_period)
                                .await
                            {
                                tracing::error!(error = %e, "Stale job reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Render queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Render queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        store: &Arc<dyn RenderJobStore>,
        config: &RenderQueueConfig,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn RenderDispatch>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match store.claim_next().await {
            Ok(Some(job)) => {
                let store = store.clone();
                let ctx = context.clone();
                let timeout = Duration::from_secs(config.job_timeout_seconds as u64);

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_job(job, store, ctx, timeout).await {
                        tracing::error!(error = %e, "Job processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(skip(store, context), fields(job.id = %job.id, job.name = %job.job_name))]
    async fn process_job(
        job: RenderJob,
        store: Arc<dyn RenderJobStore>,
        context: Weak<dyn RenderDispatch>,
        timeout: Duration,
    ) -> Result<(), anyhow::Error> {
        let ctx = context
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("RenderDispatch context was dropped"))?;

        let result = tokio::time::timeout(timeout, ctx.dispatch_job(&job)).await;

        match result {
            Ok(Ok(job_result)) => {
                store
                    .mark_completed(job.id, job_result)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to mark job as completed: {}", e))?;
                tracing::info!(job_id = %job.id, "Job completed successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                // No automatic retry: the handler already recorded the asset
                // failure; the job result keeps the error for operator triage.
                let error_result = json!({
                    "error": e.to_string(),
                });
                store
                    .mark_failed(job.id, error_result)
                    .await
                    .map_err(|mark_err| {
                        anyhow::anyhow!("Failed to mark job as failed: {}", mark_err)
                    })?;
                tracing::error!(job_id = %job.id, error = %e, "Job failed; awaiting operator replay");
                Err(e)
            }
            Err(_) => {
                let error_result = json!({
                    "error": "Job execution timed out",
                    "timeout_seconds": timeout.as_secs(),
                });
                store.mark_failed(job.id, error_result).await.ok();
                tracing::error!(
                    job_id = %job.id,
                    timeout_seconds = timeout.as_secs(),
                    "Job execution timed out"
                );
                Err(anyhow::anyhow!("Job execution timed out"))
            }
        }
    }

    /// Signals the worker pool to stop claiming new jobs and exit the main
    /// loop. Returns immediately; already-spawned handlers run to completion
    /// or timeout.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating render queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for RenderQueue {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use lectern_core::models::JobStatus;
    use lectern_db::test_helpers::MemoryRenderJobs;
    use uuid::Uuid;

    struct OkDispatch;

    #[async_trait]
    impl RenderDispatch for OkDispatch {
        async fn dispatch_job(self: Arc<Self>, job: &RenderJob) -> anyhow::Result<serde_json::Value> {
            Ok(json!({ "handled": job.job_name }))
        }
    }

    struct FailDispatch;

    #[async_trait]
    impl RenderDispatch for FailDispatch {
        async fn dispatch_job(self: Arc<Self>, _job: &RenderJob) -> anyhow::Result<serde_json::Value> {
            Err(anyhow!("handler exploded"))
        }
    }

    fn payload() -> RenderJobPayload {
        RenderJobPayload {
            source_key: "staging/x/source.docx".to_string(),
            content_type: "application/msword".to_string(),
            original_filename: "x.docx".to_string(),
            asset_id: Uuid::new_v4(),
            brand_label: None,
        }
    }

    #[tokio::test]
    async fn test_successful_job_is_marked_completed() {
        let store = Arc::new(MemoryRenderJobs::new());
        store
            .enqueue("render_document", payload().to_value())
            .await
            .unwrap();

        let job = store.claim_next().await.unwrap().unwrap();
        let ctx: Arc<dyn RenderDispatch> = Arc::new(OkDispatch);
        let dyn_store: Arc<dyn RenderJobStore> = store.clone();
        RenderQueue::process_job(job, dyn_store, Arc::downgrade(&ctx), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(store.all()[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_job_is_marked_failed_without_retry() {
        let store = Arc::new(MemoryRenderJobs::new());
        store
            .enqueue("render_document", payload().to_value())
            .await
            .unwrap();

        let job = store.claim_next().await.unwrap().unwrap();
        let ctx: Arc<dyn RenderDispatch> = Arc::new(FailDispatch);
        let dyn_store: Arc<dyn RenderJobStore> = store.clone();
        let result =
            RenderQueue::process_job(job, dyn_store, Arc::downgrade(&ctx), Duration::from_secs(5))
                .await;

        assert!(result.is_err());
        let jobs = store.all();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0]
            .result
            .as_ref()
            .unwrap()
            .to_string()
            .contains("handler exploded"));
        // Still exactly one job: failures do not re-enqueue.
        assert_eq!(store.job_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_context_is_an_error() {
        let store = Arc::new(MemoryRenderJobs::new());
        store
            .enqueue("render_document", payload().to_value())
            .await
            .unwrap();
        let job = store.claim_next().await.unwrap().unwrap();

        let weak = {
            let ctx: Arc<dyn RenderDispatch> = Arc::new(OkDispatch);
            Arc::downgrade(&ctx)
        };
        let dyn_store: Arc<dyn RenderJobStore> = store.clone();
        let result =
            RenderQueue::process_job(job, dyn_store, weak, Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = RenderQueueConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.stale_job_reap_interval_secs > 0);
    }
}

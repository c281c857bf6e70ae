//! Durable render job queue, backed by a Postgres table.
//!
//! Enqueue NOTIFYs the worker channel inside the insert transaction so a
//! listening worker wakes immediately; claiming uses `FOR UPDATE SKIP LOCKED`
//! so any number of consumers can pull from the same queue without handing
//! the same job to two workers at once. Redelivery after a worker crash is
//! the reaper's job: running jobs older than their timeout plus a grace
//! period go back to pending.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{JobStatus, RenderJob};
use lectern_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new job is enqueued.
pub const RENDER_JOB_NOTIFY_CHANNEL: &str = "lectern_render_job";

#[async_trait]
pub trait RenderJobStore: Send + Sync {
    /// Enqueue a job and return its id.
    async fn enqueue(&self, job_name: &str, payload: serde_json::Value)
        -> Result<Uuid, AppError>;

    /// Claim the oldest pending job, moving it to running. Returns `None`
    /// when the queue is empty. Safe under concurrent consumers.
    async fn claim_next(&self) -> Result<Option<RenderJob>, AppError>;

    async fn mark_completed(&self, job_id: Uuid, result: serde_json::Value)
        -> Result<(), AppError>;

    async fn mark_failed(&self, job_id: Uuid, error: serde_json::Value) -> Result<(), AppError>;

    /// Return running jobs whose claim is older than `timeout_secs + grace_secs`
    /// to pending so they are redelivered. Returns the number reaped.
    async fn reap_stale_running(
        &self,
        timeout_secs: i64,
        grace_secs: i64,
    ) -> Result<u64, AppError>;
}

/// PostgreSQL-backed render job queue.
#[derive(Clone)]
pub struct RenderJobRepository {
    pool: PgPool,
}

impl RenderJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = r#"
    id, job_name, status, payload, result, started_at, completed_at,
    created_at, updated_at
"#;

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<RenderJob, sqlx::Error> {
    Ok(RenderJob {
        id: row.get("id"),
        job_name: row.get("job_name"),
        status: row.get::<JobStatus, _>("status"),
        payload: row.get("payload"),
        result: row.get("result"),
        started_at: row.get::<Option<DateTime<Utc>>, _>("started_at"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl RenderJobStore for RenderJobRepository {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO render_jobs (job_name, payload)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(job_name)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;

        let job_id: Uuid = row.get("id");

        sqlx::query(&format!("NOTIFY {}", RENDER_JOB_NOTIFY_CHANNEL))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(job_id = %job_id, job_name = %job_name, "Job enqueued");

        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<RenderJob>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM render_jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
            JOB_COLUMNS
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let job_id: Uuid = row.get("id");

        let claimed = sqlx::query(&format!(
            r#"
            UPDATE render_jobs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(job_from_row(&claimed)?))
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE render_jobs
            SET status = 'completed', result = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(result)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: serde_json::Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE render_jobs
            SET status = 'failed', result = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn reap_stale_running(
        &self,
        timeout_secs: i64,
        grace_secs: i64,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE render_jobs
            SET status = 'pending', started_at = NULL, updated_at = NOW()
            WHERE status = 'running'
              AND started_at < NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(timeout_secs + grace_secs)
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped = reaped, "Returned stale running jobs to pending");
        }
        Ok(reaped)
    }
}

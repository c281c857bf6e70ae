//! Upload session store.
//!
//! The received-chunk set is mutated with single server-side statements so
//! concurrent chunk writes for the same session can never lose an index or
//! double-count a re-uploaded one. Consuming a session is a
//! `DELETE … RETURNING`, so of two concurrent finalize calls exactly one
//! observes the session and the other gets nothing back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{NewUploadSession, UploadSession};
use lectern_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session. Fails if the id already exists.
    async fn create(&self, session: NewUploadSession) -> Result<(), AppError>;

    /// Fetch a session by id.
    async fn get(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError>;

    /// Record receipt of a chunk. Re-recording the same index overwrites the
    /// previous entry and does not change the received count.
    async fn record_chunk(
        &self,
        session_id: Uuid,
        chunk_index: i32,
        size: i64,
    ) -> Result<(), AppError>;

    /// Received chunk indices in ascending order.
    async fn received_indices(&self, session_id: Uuid) -> Result<Vec<i32>, AppError>;

    /// Delete the session and return it. Exactly one concurrent caller wins;
    /// everyone else gets `None`.
    async fn consume(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError>;

    /// Sessions whose TTL has passed, for the cleanup sweep.
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError>;
}

/// PostgreSQL-backed session store.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = r#"
    id, owner_id, container_id, filename, content_type, file_size,
    chunk_size, total_chunks, secure, scratch_prefix, expires_at, created_at
"#;

fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<UploadSession, sqlx::Error> {
    Ok(UploadSession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        container_id: row.get("container_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        file_size: row.get("file_size"),
        chunk_size: row.get("chunk_size"),
        total_chunks: row.get("total_chunks"),
        secure: row.get("secure"),
        scratch_prefix: row.get("scratch_prefix"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl SessionStore for SessionRepository {
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id))]
    async fn create(&self, session: NewUploadSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                id, owner_id, container_id, filename, content_type, file_size,
                chunk_size, total_chunks, secure, scratch_prefix, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.owner_id)
        .bind(session.container_id)
        .bind(session.filename)
        .bind(session.content_type)
        .bind(session.file_size)
        .bind(session.chunk_size)
        .bind(session.total_chunks)
        .bind(session.secure)
        .bind(session.scratch_prefix)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM upload_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose().map_err(AppError::from)
    }

    async fn record_chunk(
        &self,
        session_id: Uuid,
        chunk_index: i32,
        size: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_session_chunks (session_id, chunk_index, size)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, chunk_index)
            DO UPDATE SET size = EXCLUDED.size, uploaded_at = NOW()
            "#,
        )
        .bind(session_id)
        .bind(chunk_index)
        .bind(size)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn received_indices(&self, session_id: Uuid) -> Result<Vec<i32>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index FROM upload_session_chunks
            WHERE session_id = $1
            ORDER BY chunk_index
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("chunk_index")).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn consume(&self, session_id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query(&format!(
            "DELETE FROM upload_sessions WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose().map_err(AppError::from)
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM upload_sessions WHERE expires_at < $1",
            SESSION_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)
    }
}

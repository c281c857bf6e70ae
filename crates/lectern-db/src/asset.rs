//! Asset store.
//!
//! Status writes are idempotent plain UPDATEs: the render queue delivers
//! at-least-once, and re-writing COMPLETED with the same storage key and
//! page count is harmless by design of the deterministic output key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{Asset, AssetKind, NewAsset, RenderStatus};
use lectern_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError>;

    async fn get(&self, asset_id: Uuid) -> Result<Option<Asset>, AppError>;

    /// Confirm the asset is in PROCESSING (step 1 of the render pipeline).
    async fn mark_processing(&self, asset_id: Uuid) -> Result<(), AppError>;

    /// Record a completed render: status, private storage key, normalized
    /// display name, and the number of pages actually watermarked.
    async fn mark_completed(
        &self,
        asset_id: Uuid,
        storage_key: &str,
        display_name: &str,
        page_count: i32,
    ) -> Result<(), AppError>;

    /// Record a failed render with its step code.
    async fn mark_failed(&self, asset_id: Uuid, failure_code: &str) -> Result<(), AppError>;
}

/// PostgreSQL-backed asset store.
#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ASSET_COLUMNS: &str = r#"
    id, container_id, title, display_name, kind, storage_key, render_status,
    is_secure, page_count, position, failure_code, created_at, updated_at
"#;

fn asset_from_row(row: &sqlx::postgres::PgRow) -> Result<Asset, sqlx::Error> {
    Ok(Asset {
        id: row.get("id"),
        container_id: row.get("container_id"),
        title: row.get("title"),
        display_name: row.get("display_name"),
        kind: row.get::<AssetKind, _>("kind"),
        storage_key: row.get("storage_key"),
        render_status: row.get::<RenderStatus, _>("render_status"),
        is_secure: row.get("is_secure"),
        page_count: row.get("page_count"),
        position: row.get("position"),
        failure_code: row.get("failure_code"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self, asset), fields(container_id = %asset.container_id))]
    async fn create(&self, asset: NewAsset) -> Result<Asset, AppError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO assets (
                container_id, title, kind, storage_key, render_status,
                is_secure, page_count, position
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7,
                COALESCE((SELECT MAX(position) + 1 FROM assets WHERE container_id = $1), 0))
            RETURNING {}
            "#,
            ASSET_COLUMNS
        ))
        .bind(asset.container_id)
        .bind(asset.title)
        .bind(asset.kind)
        .bind(asset.storage_key)
        .bind(asset.render_status)
        .bind(asset.is_secure)
        .bind(asset.page_count)
        .fetch_one(&self.pool)
        .await?;

        asset_from_row(&row).map_err(AppError::from)
    }

    async fn get(&self, asset_id: Uuid) -> Result<Option<Asset>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(asset_from_row).transpose().map_err(AppError::from)
    }

    async fn mark_processing(&self, asset_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET render_status = 'processing', storage_key = '', page_count = 0,
                failure_code = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(asset_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset not found: {}", asset_id)));
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        asset_id: Uuid,
        storage_key: &str,
        display_name: &str,
        page_count: i32,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET render_status = 'completed', storage_key = $2, display_name = $3,
                page_count = $4, failure_code = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(asset_id)
        .bind(storage_key)
        .bind(display_name)
        .bind(page_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset not found: {}", asset_id)));
        }
        Ok(())
    }

    async fn mark_failed(&self, asset_id: Uuid, failure_code: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET render_status = 'failed', storage_key = '', page_count = 0,
                failure_code = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(asset_id)
        .bind(failure_code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Asset not found: {}", asset_id)));
        }
        Ok(())
    }
}

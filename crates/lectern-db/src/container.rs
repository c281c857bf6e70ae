//! Container ownership lookups.
//!
//! Container CRUD belongs to the catalog service; this store only answers
//! the upload authorization question: may this user manage that container.

use async_trait::async_trait;
use lectern_core::models::Container;
use lectern_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn get(&self, container_id: Uuid) -> Result<Option<Container>, AppError>;

    /// Whether `user_id` owns or has management rights over the container.
    async fn can_manage(&self, user_id: Uuid, container_id: Uuid) -> Result<bool, AppError>;
}

/// PostgreSQL-backed container store.
#[derive(Clone)]
pub struct ContainerRepository {
    pool: PgPool,
}

impl ContainerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContainerStore for ContainerRepository {
    async fn get(&self, container_id: Uuid) -> Result<Option<Container>, AppError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, created_at FROM containers WHERE id = $1",
        )
        .bind(container_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Container {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        }))
    }

    async fn can_manage(&self, user_id: Uuid, container_id: Uuid) -> Result<bool, AppError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM containers WHERE id = $1 AND owner_id = $2
                UNION
                SELECT 1 FROM container_managers WHERE container_id = $1 AND user_id = $2
            ) AS can_manage
            "#,
        )
        .bind(container_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("can_manage"))
    }
}

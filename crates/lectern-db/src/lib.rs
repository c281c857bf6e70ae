//! Persistence layer: store traits and their PostgreSQL implementations.
//!
//! The upload and render services depend on the traits, never on the
//! concrete repositories, so multiple server instances share one Postgres
//! key space (no process-global session state) and tests run against the
//! in-memory fakes in [test_helpers].

pub mod asset;
pub mod container;
pub mod render_job;
pub mod session;
pub mod test_helpers;

pub use asset::{AssetRepository, AssetStore};
pub use container::{ContainerRepository, ContainerStore};
pub use render_job::{RenderJobRepository, RenderJobStore, RENDER_JOB_NOTIFY_CHANNEL};
pub use session::{SessionRepository, SessionStore};

/// Run pending schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

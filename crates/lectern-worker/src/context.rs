//! Job dispatch context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `dispatch_job` when processing a claimed job; the implementation matches on
//! job name and invokes the appropriate handler.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use lectern_core::models::RenderJob;

/// Context for job dispatch.
///
/// Implemented by the API's application state. The worker holds a weak
/// reference and calls `dispatch_job` when processing a claimed job.
#[async_trait]
pub trait RenderDispatch: Send + Sync {
    /// Dispatch a job to the appropriate handler and return the result.
    async fn dispatch_job(self: Arc<Self>, job: &RenderJob) -> Result<serde_json::Value>;
}

/// Placeholder context used when no real context exists yet (e.g. during init).
/// Dispatch always errors.
struct NoopContext;

#[async_trait]
impl RenderDispatch for NoopContext {
    async fn dispatch_job(self: Arc<Self>, _job: &RenderJob) -> Result<serde_json::Value> {
        Err(anyhow!("NoopContext: no dispatch context available"))
    }
}

/// Returns a weak reference to a no-op context. Use as placeholder when
/// building the queue before the real AppState context exists.
pub fn empty_context_weak() -> Weak<dyn RenderDispatch> {
    let n: Arc<dyn RenderDispatch> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}

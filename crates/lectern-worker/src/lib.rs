//! Render queue worker infrastructure.
//!
//! The queue itself is a Postgres table (see `lectern-db`); this crate runs
//! the consumer side: a bounded worker pool that claims jobs on
//! LISTEN/NOTIFY wakeups or poll ticks and dispatches them through the
//! [`RenderDispatch`] trait implemented by the application state.

pub mod context;
pub mod queue;

pub use context::{empty_context_weak, RenderDispatch};
pub use queue::{RenderQueue, RenderQueueConfig};

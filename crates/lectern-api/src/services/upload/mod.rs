//! Chunked upload ingestion: session init, chunk receipt, assembly, and the
//! routing decision into direct-publish or the secure render pipeline.

pub mod router;
pub mod service;

pub use router::{IngestOutcome, IngestRequest, IngestionRouter};
pub use service::{ChunkProgress, FinalizeOutcome, InitUpload, UploadLimits, UploadService};

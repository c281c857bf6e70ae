pub mod asset;
pub mod container;
pub mod render_job;
pub mod upload_session;

pub use asset::{Asset, AssetKind, AssetResponse, NewAsset, RenderStatus};
pub use container::Container;
pub use render_job::{JobStatus, RenderJob, RenderJobPayload, RENDER_DOCUMENT_JOB};
pub use upload_session::{
    expected_chunk_count, expected_chunk_len, NewUploadSession, UploadSession,
};

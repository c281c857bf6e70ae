//! Storage backend factory.

use crate::traits::{Storage, StorageError, StorageResult};
use lectern_core::config::{Config, StorageBackendKind};
use std::sync::Arc;

/// Build the storage backend selected by configuration.
///
/// Config validation has already guaranteed the per-backend settings are
/// present, so missing values here are internal errors.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend {
        StorageBackendKind::Local => {
            #[cfg(feature = "storage-local")]
            {
                let path = config.local_storage_path.as_deref().ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_PATH not set".to_string())
                })?;
                let base_url = config.local_storage_base_url.clone().ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not set".to_string())
                })?;
                let storage = crate::local::LocalStorage::new(path, base_url).await?;
                tracing::info!(path = %path, "Using local storage backend");
                Ok(Arc::new(storage))
            }
            #[cfg(not(feature = "storage-local"))]
            {
                Err(StorageError::ConfigError(
                    "Local storage backend not compiled in (enable feature storage-local)"
                        .to_string(),
                ))
            }
        }
        StorageBackendKind::S3 => {
            #[cfg(feature = "storage-s3")]
            {
                let public_bucket = config.s3_public_bucket.clone().ok_or_else(|| {
                    StorageError::ConfigError("S3_PUBLIC_BUCKET not set".to_string())
                })?;
                let private_bucket = config.s3_private_bucket.clone().ok_or_else(|| {
                    StorageError::ConfigError("S3_PRIVATE_BUCKET not set".to_string())
                })?;
                let region = config
                    .s3_region
                    .clone()
                    .ok_or_else(|| StorageError::ConfigError("S3_REGION not set".to_string()))?;
                let storage = crate::s3::S3Storage::new(
                    public_bucket.clone(),
                    private_bucket,
                    region,
                    config.s3_endpoint.clone(),
                )
                .await?;
                tracing::info!(public_bucket = %public_bucket, "Using S3 storage backend");
                Ok(Arc::new(storage))
            }
            #[cfg(not(feature = "storage-s3"))]
            {
                Err(StorageError::ConfigError(
                    "S3 storage backend not compiled in (enable feature storage-s3)".to_string(),
                ))
            }
        }
    }
}

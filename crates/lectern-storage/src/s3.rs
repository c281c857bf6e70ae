use crate::keys::is_public_key;
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{Error as ObjectStoreError, PutPayload};

/// S3 storage implementation
///
/// Public and private objects live in two separate buckets; the public bucket
/// carries a public-read policy, the private bucket is reachable only with
/// service credentials. Reads and deletes route to the right bucket by key
/// namespace.
#[derive(Clone)]
pub struct S3Storage {
    public_store: AmazonS3,
    private_store: AmazonS3,
    public_bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `public_bucket` - bucket for direct-publish documents (public-read)
    /// * `private_bucket` - bucket for scratch, staging, and rendered objects
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        public_bucket: String,
        private_bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let public_store = Self::build_store(&public_bucket, &region, endpoint_url.as_deref())?;
        let private_store = Self::build_store(&private_bucket, &region, endpoint_url.as_deref())?;

        Ok(S3Storage {
            public_store,
            private_store,
            public_bucket,
            region,
            endpoint_url,
        })
    }

    fn build_store(
        bucket: &str,
        region: &str,
        endpoint_url: Option<&str>,
    ) -> StorageResult<AmazonS3> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.to_string())
            .with_bucket_name(bucket.to_string());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.to_string())
                .with_allow_http(allow_http);
        }

        builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))
    }

    /// Route a key to the bucket holding its namespace.
    fn store_for(&self, storage_key: &str) -> &AmazonS3 {
        if is_public_key(storage_key) {
            &self.public_store
        } else {
            &self.private_store
        }
    }

    /// Generate public URL for an object in the public bucket.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            // Path-style for S3-compatible providers
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.public_bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.public_bucket, self.region, key
            )
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put_public(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        if !is_public_key(storage_key) {
            return Err(StorageError::InvalidKey(format!(
                "Key is not in the public namespace: {}",
                storage_key
            )));
        }

        let location = Path::from(storage_key);
        self.public_store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.public_bucket,
                    key = %storage_key,
                    "S3 upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        Ok(self.generate_url(storage_key))
    }

    async fn put_private(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        if is_public_key(storage_key) {
            return Err(StorageError::InvalidKey(format!(
                "Key is in the public namespace: {}",
                storage_key
            )));
        }

        let location = Path::from(storage_key);
        self.private_store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %storage_key, "S3 upload failed");
                StorageError::UploadFailed(e.to_string())
            })?;

        Ok(())
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let location = Path::from(storage_key);
        let result = self
            .store_for(storage_key)
            .get(&location)
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => {
                    StorageError::NotFound(storage_key.to_string())
                }
                other => StorageError::DownloadFailed(other.to_string()),
            })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let location = Path::from(storage_key);
        let result = self
            .store_for(storage_key)
            .get(&location)
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => {
                    StorageError::NotFound(storage_key.to_string())
                }
                other => StorageError::DownloadFailed(other.to_string()),
            })?;

        let stream = result
            .into_stream()
            .map(|item| item.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let location = Path::from(storage_key);
        match self.store_for(storage_key).delete(&location).await {
            Ok(()) => Ok(()),
            Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = Path::from(storage_key);
        match self.store_for(storage_key).head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

//! In-memory storage backend.
//!
//! Used by tests that exercise the upload and render pipelines without a
//! filesystem or network. Behaves like the real backends: overwrite wins,
//! delete of a missing key succeeds, downloads of missing keys are NotFound.

use crate::keys::is_public_key;
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (test assertions).
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys currently stored, sorted (test assertions).
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
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
        self.objects
            .lock()
            .unwrap()
            .insert(storage_key.to_string(), data);
        Ok(format!("memory://{}", storage_key))
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
        self.objects
            .lock()
            .unwrap()
            .insert(storage_key.to_string(), data);
        Ok(())
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let data = self.download(storage_key).await?;
        let stream = futures::stream::once(async move { Ok(Bytes::from(data)) });
        Ok(Box::pin(stream))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(storage_key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let storage = MemoryStorage::new();
        storage
            .put_private("scratch/s/00000", b"first".to_vec(), "application/octet-stream")
            .await
            .unwrap();
        storage
            .put_private("scratch/s/00000", b"second".to_vec(), "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(storage.download("scratch/s/00000").await.unwrap(), b"second");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.download("staging/x/source.pdf").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("staging/x/source.pdf").await.unwrap());
        assert!(storage.delete("staging/x/source.pdf").await.is_ok());
    }
}

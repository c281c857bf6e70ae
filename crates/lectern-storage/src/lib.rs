//! Object storage abstraction for Lectern.
//!
//! Keys are namespaced by role (see [keys]): `documents/` is public-read,
//! everything else (`scratch/`, `staging/`, `rendered/`) is private and only
//! reachable through the service. Backends route reads and deletes by that
//! namespace, so callers never name a bucket or directory directly.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};

/// Which backend a [`Storage`] implementation talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

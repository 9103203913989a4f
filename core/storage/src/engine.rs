//! Storage engine facade: one backend, chosen once from configuration.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::config::StorageConfig;
use crate::local::LocalStorage;
use crate::object::ObjectStorage;
use crate::provider::{ByteStream, Storage};
use crate::{gcs, s3};
use fileengine_common::{ObjectInfo, Result, StoragePath};

/// The closed set of supported backends.
pub enum Backend {
    Local(LocalStorage),
    S3(ObjectStorage),
    Gcs(ObjectStorage),
    Memory(ObjectStorage),
}

/// Owns the selected backend and exposes the uniform `Storage` contract.
///
/// Switching backends means building a new engine; there is no hot reload.
pub struct StorageEngine {
    backend: Backend,
}

impl StorageEngine {
    /// Build the backend named by `config`.
    ///
    /// # Errors
    /// - Invalid or incomplete configuration
    /// - Local root cannot be created
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config.validate()?;

        let backend = match config {
            StorageConfig::Local { root } => Backend::Local(LocalStorage::new(root)?),
            StorageConfig::S3(s3_config) => Backend::S3(s3::connect(s3_config)?),
            StorageConfig::Gcs(gcs_config) => Backend::Gcs(gcs::connect(gcs_config)?),
            StorageConfig::Memory => Backend::Memory(ObjectStorage::in_memory()),
        };

        info!(backend = config.backend_name(), "Storage engine initialised");
        Ok(Self { backend })
    }

    /// Engine over a local directory.
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            backend: Backend::Local(LocalStorage::new(root)?),
        })
    }

    /// Engine over a process-local object store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(ObjectStorage::in_memory()),
        }
    }

    /// Borrow the selected backend.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn storage(&self) -> &dyn Storage {
        match &self.backend {
            Backend::Local(local) => local,
            Backend::S3(store) | Backend::Gcs(store) | Backend::Memory(store) => store,
        }
    }
}

#[async_trait]
impl Storage for StorageEngine {
    fn name(&self) -> &str {
        self.storage().name()
    }

    async fn create_folder(&self, path: &StoragePath) -> Result<()> {
        self.storage().create_folder(path).await
    }

    async fn atomic_write(&self, path: &StoragePath, stream: ByteStream) -> Result<u64> {
        self.storage().atomic_write(path, stream).await
    }

    async fn move_object(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
        self.storage().move_object(from, to).await
    }

    async fn delete(&self, path: &StoragePath) -> Result<()> {
        self.storage().delete(path).await
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool> {
        self.storage().exists(path).await
    }

    async fn open(&self, path: &StoragePath) -> Result<ByteStream> {
        self.storage().open(path).await
    }

    async fn list(&self, prefix: &StoragePath) -> Result<Vec<ObjectInfo>> {
        self.storage().list(prefix).await
    }
}

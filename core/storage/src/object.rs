//! Flat object-store backend (S3, GCS, in-memory).
//!
//! Object stores have no directories and no rename. Folders are modeled as
//! key prefixes marked by a zero-length placeholder object, atomic writes
//! upload to a temporary key and commit with a server-side copy, and moves
//! are always copy followed by delete.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::sync::Arc;
use percent_encoding::percent_decode_str;
use tracing::{debug, info, warn};

use crate::provider::{is_temp_name, temp_name, ByteStream, Storage};
use fileengine_common::{Error, ObjectInfo, Result, StoragePath};

/// Name of the zero-length object that marks a logical folder.
pub const FOLDER_MARKER: &str = ".folder";

/// Upper bound on concurrently uploading multipart parts.
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// Storage backend over any `object_store` implementation.
pub struct ObjectStorage {
    name: &'static str,
    store: Arc<dyn ObjectStore>,
    /// Namespace inside the bucket, split into key segments.
    prefix: Vec<String>,
}

impl ObjectStorage {
    /// Wrap an object store under an optional key prefix.
    pub fn new(name: &'static str, store: Arc<dyn ObjectStore>, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .unwrap_or("")
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            name,
            store,
            prefix,
        }
    }

    /// Process-local object store, useful for testing and development.
    pub fn in_memory() -> Self {
        Self::new("memory", Arc::new(InMemory::new()), None)
    }

    fn key(&self, path: &StoragePath) -> ObjectPath {
        ObjectPath::from_iter(
            self.prefix
                .iter()
                .chain(path.components().iter())
                .map(String::as_str),
        )
    }

    fn marker_key(&self, folder: &StoragePath) -> ObjectPath {
        self.key(folder).child(FOLDER_MARKER)
    }

    /// Sibling key used while an upload is in flight.
    fn temp_key(&self, path: &StoragePath) -> ObjectPath {
        let parent = path.parent().unwrap_or_else(StoragePath::root);
        self.key(&parent).child(temp_name().as_str())
    }

    /// `None` for the bucket root so listings are not restricted.
    fn list_prefix(&self, path: &StoragePath) -> Option<ObjectPath> {
        if self.prefix.is_empty() && path.is_root() {
            None
        } else {
            Some(self.key(path))
        }
    }

    /// Translate a store key back into a logical path.
    ///
    /// Key parts come back percent-encoded (`#` as `%23`, `%` as `%25`);
    /// they are decoded so listed paths can be fed straight back in.
    fn logical(&self, location: &ObjectPath) -> Option<StoragePath> {
        let parts = location
            .parts()
            .map(|part| {
                percent_decode_str(part.as_ref())
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
            })
            .collect::<std::result::Result<Vec<String>, _>>()
            .ok()?;
        if parts.len() < self.prefix.len() || parts[..self.prefix.len()] != self.prefix[..] {
            return None;
        }
        StoragePath::sanitize(&parts[self.prefix.len()..]).ok()
    }

    async fn head_exists(&self, key: &ObjectPath, path: &StoragePath) -> Result<bool> {
        match self.store.head(key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Error::backend("exists", path.to_string(), e)),
        }
    }

    async fn upload_temp(&self, tmp: &ObjectPath, path: &StoragePath, mut stream: ByteStream) -> Result<u64> {
        let upload = self
            .store
            .put_multipart(tmp)
            .await
            .map_err(store_err("atomic_write", path))?;
        let mut writer = WriteMultipart::new(upload);
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let step = match chunk {
                Ok(bytes) => match writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                    Ok(()) => {
                        writer.write(&bytes);
                        written += bytes.len() as u64;
                        Ok(())
                    }
                    Err(e) => Err(Error::backend("atomic_write", path.to_string(), e)),
                },
                Err(e) => Err(e),
            };

            if let Err(e) = step {
                if let Err(abort) = writer.abort().await {
                    warn!(path = %path, error = %abort, "Failed to abort multipart upload");
                }
                return Err(e);
            }
        }

        writer
            .finish()
            .await
            .map_err(store_err("atomic_write", path))?;
        Ok(written)
    }

    async fn discard_temp(&self, tmp: &ObjectPath, path: &StoragePath) {
        if let Err(e) = self.store.delete(tmp).await {
            // An orphaned temp object is a cleanup concern only.
            warn!(path = %path, temp = %tmp, error = %e, "Failed to delete temporary object");
        }
    }
}

/// Map object store failures, keeping not-found distinct from outages.
fn store_err(operation: &'static str, path: &StoragePath) -> impl FnOnce(object_store::Error) -> Error {
    let path = path.to_string();
    move |e| match e {
        object_store::Error::NotFound { .. } => Error::NotFound(path),
        object_store::Error::AlreadyExists { .. } => Error::AlreadyExists(path),
        other => Error::backend(operation, path, other),
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn name(&self) -> &str {
        self.name
    }

    async fn create_folder(&self, path: &StoragePath) -> Result<()> {
        if path.is_root() {
            return Ok(());
        }

        // Overwriting an existing placeholder is harmless.
        self.store
            .put(&self.marker_key(path), PutPayload::from(Bytes::new()))
            .await
            .map_err(store_err("create_folder", path))?;

        info!(path = %path, backend = self.name, "Folder created");
        Ok(())
    }

    async fn atomic_write(&self, path: &StoragePath, stream: ByteStream) -> Result<u64> {
        path.require_named()?;
        let final_key = self.key(path);
        let tmp_key = self.temp_key(path);

        let written = self.upload_temp(&tmp_key, path, stream).await?;

        // The copy is the commit point.
        if let Err(e) = self.store.copy(&tmp_key, &final_key).await {
            self.discard_temp(&tmp_key, path).await;
            return Err(store_err("atomic_write", path)(e));
        }
        self.discard_temp(&tmp_key, path).await;

        debug!(path = %path, size = written, backend = self.name, "Atomic write committed");
        Ok(written)
    }

    async fn move_object(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
        from.require_named()?;
        to.require_named()?;
        let src = self.key(from);
        let dst = self.key(to);

        self.store
            .copy(&src, &dst)
            .await
            .map_err(store_err("move", from))?;

        // Both copies exist until this delete lands.
        self.store
            .delete(&src)
            .await
            .map_err(store_err("move", from))?;

        debug!(from = %from, to = %to, backend = self.name, "Moved");
        Ok(())
    }

    async fn delete(&self, path: &StoragePath) -> Result<()> {
        path.require_named()?;
        let key = self.key(path);

        if self.head_exists(&key, path).await? {
            self.store.delete(&key).await.map_err(store_err("delete", path))?;
            debug!(path = %path, backend = self.name, "Deleted object");
            return Ok(());
        }

        // Not an object; remove the folder placeholder and everything below it.
        let locations: Vec<ObjectPath> = self
            .store
            .list(Some(&key))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(store_err("delete", path))?;

        if locations.is_empty() {
            return Err(Error::NotFound(path.to_string()));
        }

        for location in &locations {
            self.store
                .delete(location)
                .await
                .map_err(store_err("delete", path))?;
        }

        debug!(path = %path, objects = locations.len(), backend = self.name, "Deleted folder");
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool> {
        if path.is_root() {
            return Ok(true);
        }
        if self.head_exists(&self.key(path), path).await? {
            return Ok(true);
        }
        if self.head_exists(&self.marker_key(path), path).await? {
            return Ok(true);
        }

        // Implicit folder: some object lives below the prefix.
        let listing = self
            .store
            .list_with_delimiter(Some(&self.key(path)))
            .await
            .map_err(store_err("exists", path))?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }

    async fn open(&self, path: &StoragePath) -> Result<ByteStream> {
        path.require_named()?;
        let result = self
            .store
            .get(&self.key(path))
            .await
            .map_err(store_err("open", path))?;

        let label = path.to_string();
        let stream = result
            .into_stream()
            .map_err(move |e| Error::backend("open", label.clone(), e));
        Ok(Box::pin(stream))
    }

    async fn list(&self, prefix: &StoragePath) -> Result<Vec<ObjectInfo>> {
        let listing = self
            .store
            .list_with_delimiter(self.list_prefix(prefix).as_ref())
            .await
            .map_err(store_err("list", prefix))?;

        let mut results = Vec::new();

        for common in &listing.common_prefixes {
            if let Some(folder) = self.logical(common) {
                results.push(ObjectInfo::folder(&folder));
            }
        }

        for meta in &listing.objects {
            let is_placeholder =
                meta.size == 0 && meta.location.filename() == Some(FOLDER_MARKER);
            let is_temp = meta.location.filename().is_some_and(is_temp_name);
            if is_placeholder || is_temp {
                continue;
            }
            if let Some(object) = self.logical(&meta.location) {
                results.push(ObjectInfo::file(&object, meta.size as u64));
            }
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }
}

//! Local filesystem storage backend.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::provider::{is_temp_name, temp_name, ByteStream, Storage, CHUNK_SIZE};
use crate::sanitize::DiskRoot;
use fileengine_common::{Error, ObjectInfo, Result, StoragePath};

/// Local filesystem storage backend.
///
/// Folders are real directories under the configured root.
pub struct LocalStorage {
    root: DiskRoot,
}

impl LocalStorage {
    /// Create a new local backend with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Invalid path
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            root: DiskRoot::new(root)?,
        })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    fn temp_sibling(target: &Path) -> PathBuf {
        let name = temp_name();
        match target.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    async fn discard_temp(tmp: &Path) {
        if let Err(e) = fs::remove_file(tmp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(error = %e, "Failed to remove temporary file");
            }
        }
    }

    async fn ensure_parent(&self, full: &Path, path: &StoragePath, operation: &'static str) -> Result<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await.map_err(|e| match e.kind() {
                // A file sits where a parent folder should be.
                ErrorKind::AlreadyExists | ErrorKind::NotADirectory => {
                    Error::InvalidInput(format!("Parent of {} is not a folder", path))
                }
                _ => io_err(operation, path)(e),
            })?;
        }
        Ok(())
    }

    /// Stream into a fresh temp file; the caller renames it into place.
    async fn write_temp(&self, tmp: &Path, path: &StoragePath, mut stream: ByteStream) -> Result<u64> {
        let mut file = fs::File::create(tmp)
            .await
            .map_err(io_err("atomic_write", path))?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(io_err("atomic_write", path))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(io_err("atomic_write", path))?;
        file.sync_all().await.map_err(io_err("atomic_write", path))?;
        Ok(written)
    }

    /// Fallback for renames the OS refuses (e.g. across devices).
    ///
    /// Copies into a temp sibling of the destination and renames it into
    /// place, then removes the source. A crash before the final removal
    /// leaves both copies.
    pub(crate) async fn copy_then_delete(
        &self,
        src: &Path,
        dst: &Path,
        from: &StoragePath,
        to: &StoragePath,
    ) -> Result<()> {
        let meta = fs::metadata(src).await.map_err(io_err("move", from))?;
        if meta.is_dir() {
            return Err(Error::InvalidInput(
                "Folders can only be moved by rename".to_string(),
            ));
        }

        let tmp = Self::temp_sibling(dst);
        if let Err(e) = fs::copy(src, &tmp).await {
            Self::discard_temp(&tmp).await;
            return Err(io_err("move", to)(e));
        }
        if let Err(e) = fs::rename(&tmp, dst).await {
            Self::discard_temp(&tmp).await;
            return Err(io_err("move", to)(e));
        }

        fs::remove_file(src).await.map_err(io_err("move", from))?;
        Ok(())
    }
}

/// Map an I/O failure to the shared taxonomy without leaking host paths.
fn io_err(operation: &'static str, path: &StoragePath) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_string();
    move |e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path),
        ErrorKind::AlreadyExists => Error::AlreadyExists(path),
        ErrorKind::NotADirectory => Error::InvalidInput(format!("{} runs through a file", path)),
        _ => Error::backend(operation, path, e),
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_folder(&self, path: &StoragePath) -> Result<()> {
        let full = self.root.resolve(path).await?;

        if let Ok(meta) = fs::metadata(&full).await {
            if !meta.is_dir() {
                return Err(Error::AlreadyExists(format!(
                    "A file exists at {}",
                    path
                )));
            }
            return Ok(());
        }

        fs::create_dir_all(&full)
            .await
            .map_err(io_err("create_folder", path))?;

        info!(path = %path, "Folder created");
        Ok(())
    }

    async fn atomic_write(&self, path: &StoragePath, stream: ByteStream) -> Result<u64> {
        path.require_named()?;
        let full = self.root.resolve(path).await?;
        self.ensure_parent(&full, path, "atomic_write").await?;

        // Same directory as the target so the rename stays on one device.
        let tmp = Self::temp_sibling(&full);

        let written = match self.write_temp(&tmp, path, stream).await {
            Ok(written) => written,
            Err(e) => {
                Self::discard_temp(&tmp).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&tmp, &full).await {
            Self::discard_temp(&tmp).await;
            return Err(io_err("atomic_write", path)(e));
        }

        debug!(path = %path, size = written, "Atomic write committed");
        Ok(written)
    }

    async fn move_object(&self, from: &StoragePath, to: &StoragePath) -> Result<()> {
        from.require_named()?;
        to.require_named()?;
        let src = self.root.resolve(from).await?;
        let dst = self.root.resolve(to).await?;

        if fs::symlink_metadata(&src).await.is_err() {
            return Err(Error::NotFound(from.to_string()));
        }
        self.ensure_parent(&dst, to, "move").await?;

        match fs::rename(&src, &dst).await {
            Ok(()) => {
                debug!(from = %from, to = %to, "Renamed");
                Ok(())
            }
            Err(e) => {
                warn!(from = %from, to = %to, error = %e, "Rename failed, falling back to copy and delete");
                self.copy_then_delete(&src, &dst, from, to).await
            }
        }
    }

    async fn delete(&self, path: &StoragePath) -> Result<()> {
        path.require_named()?;
        let full = self.root.resolve(path).await?;

        let meta = fs::symlink_metadata(&full)
            .await
            .map_err(io_err("delete", path))?;

        if meta.is_dir() {
            fs::remove_dir_all(&full).await.map_err(io_err("delete", path))?;
        } else {
            fs::remove_file(&full).await.map_err(io_err("delete", path))?;
        }

        debug!(path = %path, "Deleted");
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool> {
        let full = self.root.resolve(path).await?;
        match fs::try_exists(&full).await {
            Ok(found) => Ok(found),
            // Something below a regular file cannot exist.
            Err(e) if e.kind() == ErrorKind::NotADirectory => Ok(false),
            Err(e) => Err(Error::backend("exists", path.to_string(), e)),
        }
    }

    async fn open(&self, path: &StoragePath) -> Result<ByteStream> {
        path.require_named()?;
        let full = self.root.resolve(path).await?;

        let meta = fs::metadata(&full).await.map_err(io_err("open", path))?;
        if meta.is_dir() {
            return Err(Error::InvalidInput("Cannot open a folder".to_string()));
        }

        let file = fs::File::open(&full).await.map_err(io_err("open", path))?;
        let label = path.to_string();
        let stream = ReaderStream::with_capacity(file, CHUNK_SIZE)
            .map_err(move |e| Error::backend("open", label.clone(), e));
        Ok(Box::pin(stream))
    }

    async fn list(&self, prefix: &StoragePath) -> Result<Vec<ObjectInfo>> {
        let full = self.root.resolve(prefix).await?;

        let meta = fs::metadata(&full).await.map_err(io_err("list", prefix))?;
        if !meta.is_dir() {
            return Err(Error::InvalidInput("Not a folder".to_string()));
        }

        let mut results = Vec::new();
        let mut entries = fs::read_dir(&full).await.map_err(io_err("list", prefix))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_err("list", prefix))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!(prefix = %prefix, "Skipping entry with non UTF-8 name");
                continue;
            };
            if is_temp_name(name) {
                continue;
            }

            let child = prefix.join(name)?;
            let entry_meta = entry.metadata().await.map_err(io_err("list", &child))?;
            if entry_meta.is_dir() {
                results.push(ObjectInfo::folder(&child));
            } else {
                results.push(ObjectInfo::file(&child, entry_meta.len()));
            }
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{bytes_stream, read_all};
    use fileengine_common::ErrorCode;
    use bytes::Bytes;
    use futures::channel::mpsc;
    use futures::stream;
    use tempfile::TempDir;

    fn p(raw: &str) -> StoragePath {
        StoragePath::parse(raw).unwrap()
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| is_temp_name(name))
            .collect()
    }

    #[tokio::test]
    async fn test_local_write_open() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let path = p("/docs/test.txt");

        let written = storage
            .atomic_write(&path, bytes_stream(&b"Hello, Local!"[..]))
            .await
            .unwrap();
        assert_eq!(written, 13);

        let data = read_all(storage.open(&path).await.unwrap()).await.unwrap();
        assert_eq!(data, b"Hello, Local!");
        assert!(temp_files(&storage.root().join("docs")).is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_then_list_parent() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();

        storage.create_folder(&p("a/b/c")).await.unwrap();
        // Idempotent.
        storage.create_folder(&p("a/b/c")).await.unwrap();

        let entries = storage.list(&p("a/b")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/a/b/c");
        assert!(entries[0].is_dir);
    }

    #[tokio::test]
    async fn test_create_folder_over_file_fails() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        storage
            .atomic_write(&p("x"), bytes_stream(&b"1"[..]))
            .await
            .unwrap();

        assert!(matches!(
            storage.create_folder(&p("x")).await,
            Err(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_atomic_write_requires_name() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        assert!(matches!(
            storage
                .atomic_write(&StoragePath::root(), bytes_stream(&b"x"[..]))
                .await,
            Err(Error::PathEmpty)
        ));
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_target() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let path = p("/upload.bin");

        let broken: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::InvalidInput("client went away".to_string())),
        ]));

        assert!(storage.atomic_write(&path, broken).await.is_err());
        assert!(!storage.exists(&path).await.unwrap());
        assert!(temp_files(storage.root()).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reader_never_sees_partial_write() {
        let temp = TempDir::new().unwrap();
        let storage = std::sync::Arc::new(LocalStorage::new(temp.path()).unwrap());
        let path = p("/report.txt");

        storage
            .atomic_write(&path, bytes_stream(&b"old content"[..]))
            .await
            .unwrap();

        let (tx, rx) = mpsc::unbounded::<Result<Bytes>>();
        let writer = {
            let storage = storage.clone();
            let path = path.clone();
            tokio::spawn(async move { storage.atomic_write(&path, Box::pin(rx)).await })
        };

        tx.unbounded_send(Ok(Bytes::from_static(b"new "))).unwrap();
        tokio::task::yield_now().await;

        let during = read_all(storage.open(&path).await.unwrap()).await.unwrap();
        assert_eq!(during, b"old content");

        tx.unbounded_send(Ok(Bytes::from_static(b"content, longer"))).unwrap();
        drop(tx);
        writer.await.unwrap().unwrap();

        let after = read_all(storage.open(&path).await.unwrap()).await.unwrap();
        assert_eq!(after, b"new content, longer");
    }

    #[tokio::test]
    async fn test_path_through_file_is_caller_error() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        storage
            .atomic_write(&p("/file.txt"), bytes_stream(&b"plain"[..]))
            .await
            .unwrap();
        let nested = p("/file.txt/child");

        assert!(!storage.exists(&nested).await.unwrap());

        let err = storage
            .atomic_write(&nested, bytes_stream(&b"x"[..]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(!err.is_retryable());

        let err = storage.create_folder(&nested).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_ne!(err.code(), ErrorCode::Unavailable);

        let err = match storage.open(&nested).await {
            Ok(_) => panic!("called `Result::unwrap_err()` on an `Ok` value"),
            Err(e) => e,
        };
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_user_files_resembling_temps_are_listed() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        storage
            .atomic_write(&p("/.tmp-notes"), bytes_stream(&b"mine"[..]))
            .await
            .unwrap();
        // Leftover from an interrupted upload.
        std::fs::write(storage.root().join(temp_name()), b"orphan").unwrap();

        let entries = storage.list(&StoragePath::root()).await.unwrap();
        assert_eq!(entries, vec![ObjectInfo::file(&p("/.tmp-notes"), 4)]);
    }

    #[tokio::test]
    async fn test_move_renames() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let src = p("/uploads/tmp-1");
        let dst = p("/projects/demo/file.txt");

        storage.atomic_write(&src, bytes_stream(&b"data"[..])).await.unwrap();
        storage.move_object(&src, &dst).await.unwrap();

        assert!(!storage.exists(&src).await.unwrap());
        assert!(storage.exists(&dst).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        assert!(matches!(
            storage.move_object(&p("/nope"), &p("/dst")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_then_delete_fallback() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let from = p("/a.txt");
        let to = p("/b.txt");
        storage.atomic_write(&from, bytes_stream(&b"payload"[..])).await.unwrap();

        let src = storage.root().join("a.txt");
        let dst = storage.root().join("b.txt");
        storage.copy_then_delete(&src, &dst, &from, &to).await.unwrap();

        assert!(!storage.exists(&from).await.unwrap());
        let data = read_all(storage.open(&to).await.unwrap()).await.unwrap();
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn test_retried_move_converges() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let src = p("/a.txt");
        let dst = p("/b.txt");

        // State left by an interrupted copy-then-delete: both present.
        storage.atomic_write(&src, bytes_stream(&b"v1"[..])).await.unwrap();
        storage.atomic_write(&dst, bytes_stream(&b"v1"[..])).await.unwrap();

        storage.move_object(&src, &dst).await.unwrap();

        assert!(!storage.exists(&src).await.unwrap());
        assert!(storage.exists(&dst).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_file_and_folder() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();

        storage.create_folder(&p("/dir/sub")).await.unwrap();
        storage.atomic_write(&p("/dir/sub/f"), bytes_stream(&b"1"[..])).await.unwrap();
        storage.atomic_write(&p("/g"), bytes_stream(&b"2"[..])).await.unwrap();

        storage.delete(&p("/g")).await.unwrap();
        storage.delete(&p("/dir")).await.unwrap();

        assert!(!storage.exists(&p("/g")).await.unwrap());
        assert!(!storage.exists(&p("/dir/sub/f")).await.unwrap());
        assert!(matches!(
            storage.delete(&p("/g")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_sizes_and_errors() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();

        storage.create_folder(&p("/dir")).await.unwrap();
        storage.atomic_write(&p("/dir/one"), bytes_stream(vec![1u8; 3])).await.unwrap();
        storage.create_folder(&p("/dir/nested")).await.unwrap();

        let entries = storage.list(&p("/dir")).await.unwrap();
        assert_eq!(
            entries,
            vec![
                ObjectInfo::folder(&p("/dir/nested")),
                ObjectInfo::file(&p("/dir/one"), 3),
            ]
        );

        assert!(matches!(
            storage.list(&p("/missing")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            storage.list(&p("/dir/one")).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_open_streams_bounded_chunks() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        let path = p("/big.bin");
        let data = vec![42u8; CHUNK_SIZE * 3 + 1];
        storage.atomic_write(&path, bytes_stream(data.clone())).await.unwrap();

        let mut stream = storage.open(&path).await.unwrap();
        let mut total = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            total.extend_from_slice(&chunk);
        }
        assert_eq!(total, data);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_through_escaping_symlink_rejected() {
        let outside = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), storage.root().join("link")).unwrap();

        let result = storage
            .atomic_write(&p("/link/evil.txt"), bytes_stream(&b"x"[..]))
            .await;
        assert!(matches!(result, Err(Error::PathOutsideRoot(_))));
        assert!(!outside.path().join("evil.txt").exists());
    }
}

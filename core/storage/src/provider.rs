//! Storage contract shared by every backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use uuid::Uuid;

use fileengine_common::{ObjectInfo, Result, StoragePath};

/// Upper bound for a single chunk handed to a download stream.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Marks in-flight upload artifacts on every backend.
const TEMP_PREFIX: &str = ".fileengine-tmp-";

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Uniform folder/object contract over disk and object stores.
///
/// Paths are already confined `StoragePath`s; adapters add backend-specific
/// checks (symlink resolution on disk) before touching the medium.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the backend name (e.g., "local", "s3", "gcs").
    fn name(&self) -> &str;

    /// Idempotently ensure a logical folder exists.
    ///
    /// # Postconditions
    /// - Folder exists (hierarchical backends create parents as needed)
    /// - No error if it already existed
    async fn create_folder(&self, path: &StoragePath) -> Result<()>;

    /// Write the stream to `path` as a single unit.
    ///
    /// Readers observe either the previous state or the complete new
    /// content, never a prefix of it. Returns the number of bytes written.
    ///
    /// # Errors
    /// - `PathEmpty` if `path` is the root
    /// - Stream errors abort the write and leave the target untouched
    async fn atomic_write(&self, path: &StoragePath, stream: ByteStream) -> Result<u64>;

    /// Move an object from `from` to `to`.
    ///
    /// Tries an in-place rename first. When the backend has to fall back
    /// to copy-then-delete, a crash in between leaves both copies; the
    /// move is at-least-once and a retry converges to destination-only.
    async fn move_object(&self, from: &StoragePath, to: &StoragePath) -> Result<()>;

    /// Delete an object or a whole logical folder.
    async fn delete(&self, path: &StoragePath) -> Result<()>;

    /// Check if an object or folder exists.
    async fn exists(&self, path: &StoragePath) -> Result<bool>;

    /// Open an object for streamed reading.
    async fn open(&self, path: &StoragePath) -> Result<ByteStream>;

    /// List entries directly under `prefix`.
    ///
    /// Folder placeholders are not reported as objects.
    async fn list(&self, prefix: &StoragePath) -> Result<Vec<ObjectInfo>>;
}

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Split chunks larger than `max_chunk` so consumers hold bounded buffers.
pub fn rechunk(stream: ByteStream, max_chunk: usize) -> ByteStream {
    let max_chunk = max_chunk.max(1);
    Box::pin(stream.flat_map(move |item| {
        let pieces: Vec<Result<Bytes>> = match item {
            Ok(mut bytes) => {
                let mut pieces = Vec::with_capacity(bytes.len() / max_chunk + 1);
                while bytes.len() > max_chunk {
                    pieces.push(Ok(bytes.split_to(max_chunk)));
                }
                if !bytes.is_empty() {
                    pieces.push(Ok(bytes));
                }
                pieces
            }
            Err(e) => vec![Err(e)],
        };
        stream::iter(pieces)
    }))
}

/// Fresh name for an in-flight upload, placed next to its target.
pub(crate) fn temp_name() -> String {
    format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple())
}

/// Whether `name` was produced by [`temp_name`]. Listings hide these.
///
/// Only the exact generated shape matches, so user files that merely
/// start with a dot or contain "tmp" stay visible.
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.strip_prefix(TEMP_PREFIX).is_some_and(|id| {
        id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}

/// Drain a stream into memory.
pub async fn read_all(mut stream: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileengine_common::Error;

    #[tokio::test]
    async fn test_rechunk_bounds_chunk_size() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let mut stream = rechunk(bytes_stream(data.clone()), CHUNK_SIZE);

        let mut sizes = Vec::new();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            sizes.push(chunk.len());
            collected.extend_from_slice(&chunk);
        }

        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
        assert_eq!(collected, data);
    }

    #[test]
    fn test_temp_names_are_recognized_exactly() {
        let name = temp_name();
        assert!(is_temp_name(&name));

        assert!(!is_temp_name(".tmp-notes"));
        assert!(!is_temp_name(".fileengine-tmp-"));
        assert!(!is_temp_name(".fileengine-tmp-draft.txt"));
        assert!(!is_temp_name(&format!("{}x", name)));
    }

    #[tokio::test]
    async fn test_read_all_propagates_errors() {
        let stream: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(Error::InvalidInput("broken".to_string())),
        ]));
        assert!(read_all(stream).await.is_err());
    }
}

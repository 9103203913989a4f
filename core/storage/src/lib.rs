//! Backend-agnostic storage engine for the file engine.
//!
//! Gives POSIX-like folder/object semantics over a local disk or a flat
//! object store (S3, GCS) with the same atomicity and confinement rules.
//!
//! # Design Principles
//! - Confinement first: every path is a sanitized `StoragePath`, and disk
//!   paths are re-checked after symlink resolution
//! - Atomic writes: temp location plus rename (disk) or copy (object store)
//! - Async operations with streamed bodies in bounded chunks
//! - One backend per process, chosen from configuration

pub mod config;
pub mod engine;
pub mod gcs;
pub mod local;
pub mod object;
pub mod provider;
pub mod s3;
pub mod sanitize;

pub use config::{GcsConfig, S3Config, StorageConfig};
pub use engine::{Backend, StorageEngine};
pub use local::LocalStorage;
pub use object::ObjectStorage;
pub use provider::{bytes_stream, read_all, rechunk, ByteStream, Storage, CHUNK_SIZE};
pub use sanitize::DiskRoot;

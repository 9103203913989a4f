//! Backend selection configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use fileengine_common::{Error, Result};

/// Selects exactly one storage backend at startup.
///
/// Serialized with a `backend` tag, e.g. `{"backend": "local", "root": "/mnt/files"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Directory tree on a local disk.
    Local { root: PathBuf },
    /// S3 or any S3-compatible endpoint (MinIO, R2, ...).
    S3(S3Config),
    /// Google Cloud Storage.
    Gcs(GcsConfig),
    /// Process-local object store.
    Memory,
}

/// S3 connection settings. Unset credentials fall back to the ambient
/// AWS environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Namespace prefix inside the bucket, e.g. "file-engine".
    #[serde(default)]
    pub prefix: Option<String>,
    /// Custom endpoint; enables path-style requests.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Permit plain HTTP endpoints (local MinIO).
    #[serde(default)]
    pub allow_http: bool,
}

/// GCS connection settings. Without a service account file the
/// ambient Google credentials are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub service_account_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Backend name as used in configuration.
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Local { .. } => "local",
            StorageConfig::S3(_) => "s3",
            StorageConfig::Gcs(_) => "gcs",
            StorageConfig::Memory => "memory",
        }
    }

    /// Check required fields before any client is built.
    pub fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::Local { root } if root.as_os_str().is_empty() => {
                Err(Error::Config("local backend requires 'root'".to_string()))
            }
            StorageConfig::S3(s3) if s3.bucket.trim().is_empty() => {
                Err(Error::Config("S3 bucket required".to_string()))
            }
            StorageConfig::S3(s3) if s3.access_key_id.is_some() != s3.secret_access_key.is_some() => {
                Err(Error::Config(
                    "S3 access key id and secret must be given together".to_string(),
                ))
            }
            StorageConfig::Gcs(gcs) if gcs.bucket.trim().is_empty() => {
                Err(Error::Config("GCS bucket required".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: PathBuf::from("/mnt/files"),
        }
    }
}

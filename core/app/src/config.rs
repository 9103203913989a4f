//! Process configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use fileengine_authz::{AclStore, MemoryAclStore, SqliteAclStore};
use fileengine_common::{Error, Result};
use fileengine_storage::{GcsConfig, S3Config, StorageConfig};
use fileengine_tasks::WorkerConfig;

/// Default root for the local backend.
pub const DEFAULT_ROOT: &str = "/mnt/files";

/// Where ACL entries live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum AclConfig {
    #[default]
    Memory,
    Sqlite { path: PathBuf },
}

impl AclConfig {
    /// Open the configured store.
    pub fn open(&self) -> Result<Arc<dyn AclStore>> {
        match self {
            AclConfig::Memory => Ok(Arc::new(MemoryAclStore::new())),
            AclConfig::Sqlite { path } => Ok(Arc::new(SqliteAclStore::open(path)?)),
        }
    }
}

/// Complete engine configuration.
///
/// JSON form:
/// ```json
/// {
///   "storage": {"backend": "s3", "bucket": "files", "prefix": "file-engine"},
///   "acl": {"backend": "sqlite", "path": "/var/lib/fileengine/acl.db"},
///   "worker": {"poll_interval_ms": 1000, "backoff_ms": 1000}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub acl: AclConfig,
    pub worker: WorkerConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or failed validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&json)?;
        info!(path = %path.display(), backend = config.storage.backend_name(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = var("STORAGE_BACKEND").unwrap_or_else(|| "local".to_string());
        let storage = match backend.trim().to_ascii_lowercase().as_str() {
            "local" => StorageConfig::Local {
                root: var("FILE_BASE_ROOT")
                    .unwrap_or_else(|| DEFAULT_ROOT.to_string())
                    .into(),
            },
            "s3" => StorageConfig::S3(S3Config {
                bucket: var("S3_BUCKET").unwrap_or_default(),
                region: var("S3_REGION"),
                prefix: var("S3_PREFIX"),
                endpoint: var("S3_ENDPOINT"),
                access_key_id: var("S3_ACCESS_KEY_ID"),
                secret_access_key: var("S3_SECRET_ACCESS_KEY"),
                session_token: var("S3_SESSION_TOKEN"),
                allow_http: var("S3_ALLOW_HTTP").map(|v| flag(&v)).unwrap_or(false),
            }),
            "gcs" => StorageConfig::Gcs(GcsConfig {
                bucket: var("GCS_BUCKET").unwrap_or_default(),
                prefix: var("GCS_PREFIX"),
                service_account_path: var("GCS_SERVICE_ACCOUNT_PATH").map(PathBuf::from),
            }),
            "memory" => StorageConfig::Memory,
            other => {
                return Err(Error::Config(format!("unknown storage backend: {}", other)));
            }
        };

        let acl = match var("ACL_DB_PATH") {
            Some(path) if !path.is_empty() => AclConfig::Sqlite { path: path.into() },
            _ => AclConfig::Memory,
        };

        let mut worker = WorkerConfig::default();
        if let Some(ms) = var("WORKER_BACKOFF_MS") {
            worker.backoff_ms = millis("WORKER_BACKOFF_MS", &ms)?;
        }
        if let Some(ms) = var("WORKER_POLL_INTERVAL_MS") {
            worker.poll_interval_ms = millis("WORKER_POLL_INTERVAL_MS", &ms)?;
        }

        let config = Self {
            storage,
            acl,
            worker,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the whole configuration before anything is opened.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if let AclConfig::Sqlite { path } = &self.acl {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("sqlite ACL store requires 'path'".to_string()));
            }
        }
        if self.worker.backoff_ms == 0 {
            return Err(Error::Config("worker backoff must be positive".to_string()));
        }
        Ok(())
    }
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn millis(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number of milliseconds", key)))
}

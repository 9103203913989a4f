//! Google Cloud Storage backend construction.

use object_store::gcp::GoogleCloudStorageBuilder;
use std::sync::Arc;
use tracing::info;

use crate::config::GcsConfig;
use crate::object::ObjectStorage;
use fileengine_common::{Error, Result};

/// Build a GCS backend from ambient Google credentials or a service account file.
pub fn connect(config: &GcsConfig) -> Result<ObjectStorage> {
    let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);

    if let Some(path) = &config.service_account_path {
        builder = builder.with_service_account_path(path.to_string_lossy());
    }

    let store = builder
        .build()
        .map_err(|e| Error::Config(format!("GCS client: {}", e)))?;

    info!(bucket = %config.bucket, prefix = ?config.prefix, "GCS backend ready");
    Ok(ObjectStorage::new(
        "gcs",
        Arc::new(store),
        config.prefix.as_deref(),
    ))
}

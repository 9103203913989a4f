//! S3-compatible backend construction.

use object_store::aws::AmazonS3Builder;
use std::sync::Arc;
use tracing::info;

use crate::config::S3Config;
use crate::object::ObjectStorage;
use fileengine_common::{Error, Result};

/// Build an S3 backend, layering explicit settings over the AWS environment.
pub fn connect(config: &S3Config) -> Result<ObjectStorage> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = &config.endpoint {
        // MinIO and friends expect path-style addressing.
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
    }
    if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        builder = builder
            .with_access_key_id(key_id)
            .with_secret_access_key(secret);
    }
    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }
    builder = builder.with_allow_http(config.allow_http);

    let store = builder
        .build()
        .map_err(|e| Error::Config(format!("S3 client: {}", e)))?;

    info!(bucket = %config.bucket, prefix = ?config.prefix, "S3 backend ready");
    Ok(ObjectStorage::new(
        "s3",
        Arc::new(store),
        config.prefix.as_deref(),
    ))
}

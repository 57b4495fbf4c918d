use std::path::Path;
use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;

use crate::conf::StorageConfig;
use crate::core::SyncError;

/// Creates the ObjectStore a run writes to: a local directory when
/// `local_root` is set, S3 otherwise.
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, SyncError> {
    match &config.local_root {
        Some(root) => create_local_store(root),
        None => create_s3_store(config),
    }
}

/// Creates a LocalFileSystem ObjectStore rooted at `root`.
pub fn create_local_store(root: &Path) -> Result<Arc<dyn ObjectStore>, SyncError> {
    std::fs::create_dir_all(root).map_err(|e| {
        SyncError::ConfigError(format!("creating local root {}: {}", root.display(), e))
    })?;
    let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
        SyncError::ConfigError(format!("opening local root {}: {}", root.display(), e))
    })?;
    Ok(Arc::new(store))
}

/// Creates an S3 ObjectStore from StorageConfig. Credentials come from the
/// usual AWS environment variables.
pub fn create_s3_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, SyncError> {
    let bucket = config
        .bucket
        .as_deref()
        .ok_or_else(|| SyncError::ConfigError("storage.bucket is not set".to_string()))?;

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(&config.region);

    // Custom endpoint for MinIO, LocalStack, etc.
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
    }

    let store = builder.build().map_err(|e| {
        SyncError::ConfigError(format!(
            "Failed to create S3 store for bucket '{}': {}",
            bucket, e
        ))
    })?;

    Ok(Arc::new(store))
}

use std::path::PathBuf;

use parquet::basic::{GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};

/// Parquet codec used for every artifact written by a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    Snappy,
    Zstd,
    None,
}

impl From<Compression> for parquet::basic::Compression {
    fn from(codec: Compression) -> Self {
        match codec {
            Compression::Gzip => parquet::basic::Compression::GZIP(GzipLevel::default()),
            Compression::Snappy => parquet::basic::Compression::SNAPPY,
            Compression::Zstd => parquet::basic::Compression::ZSTD(ZstdLevel::default()),
            Compression::None => parquet::basic::Compression::UNCOMPRESSED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "StorageConfig::default_prefix")]
    pub prefix: String,
    #[serde(default = "StorageConfig::default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Write to this local directory instead of S3.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default = "StorageConfig::default_max_concurrency")]
    pub max_concurrency: usize,
}

impl StorageConfig {
    fn default_prefix() -> String {
        String::from("nasdaq")
    }

    fn default_region() -> String {
        String::from("us-east-1")
    }

    fn default_max_concurrency() -> usize {
        8
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: Self::default_prefix(),
            region: Self::default_region(),
            endpoint: None,
            local_root: None,
            compression: Compression::default(),
            max_concurrency: Self::default_max_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.prefix, "nasdaq");
        assert_eq!(storage.region, "us-east-1");
        assert_eq!(storage.compression, Compression::Gzip);
        assert!(storage.bucket.is_none());
    }

    #[test]
    fn test_compression_to_parquet() {
        assert_eq!(
            parquet::basic::Compression::from(Compression::Snappy),
            parquet::basic::Compression::SNAPPY
        );
        assert!(matches!(
            parquet::basic::Compression::from(Compression::Gzip),
            parquet::basic::Compression::GZIP(_)
        ));
    }
}

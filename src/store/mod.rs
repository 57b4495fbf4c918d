mod backend;
mod gateway;
mod partition;

pub use backend::{create_local_store, create_s3_store, create_store};
pub use gateway::ObjectStoreGateway;
pub use partition::{NULL_PARTITION, PartitionBatch, split_partitions};

use std::fmt;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::core::SyncError;
use crate::refresh::RefreshMode;

/// Where a table's rows land in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Directory prefix of a hive-partitioned dataset.
    Dataset(String),
    /// Single Parquet object, replaced wholesale.
    File(String),
}

impl Destination {
    pub fn path(&self) -> &str {
        match self {
            Destination::Dataset(path) | Destination::File(path) => path,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub files: usize,
    pub partitions: Vec<String>,
}

/// Storage seam of a refresh: existence probing and Parquet writes.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Whether any object exists below `prefix`. Errors other than "not found"
    /// surface as `ModeResolutionError`.
    async fn exists(&self, prefix: &str) -> Result<bool, SyncError>;

    /// Write `batch` to `destination`. Errors surface as `WriteError`.
    async fn write(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        mode: RefreshMode,
        partition_cols: &[String],
    ) -> Result<WriteSummary, SyncError>;
}

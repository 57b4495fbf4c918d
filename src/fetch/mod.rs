mod datalink;
mod export;
mod response;

pub use datalink::DataLinkClient;
pub use export::read_export_archive;
pub use response::{ColumnInfo, rows_to_batch};

use std::path::Path;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::core::SyncError;

/// Equality filter on one column, e.g. `lastupdated = 2024-03-01`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

/// Remote side of a refresh.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Rows of `table` matching `filter`, all pages concatenated.
    async fn get_table(&self, table: &str, filter: &RowFilter) -> Result<RecordBatch, SyncError>;

    /// Download the bulk export archive of `table` to `destination`.
    async fn export_table(&self, table: &str, destination: &Path) -> Result<(), SyncError>;
}

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, info};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use parquet::arrow::AsyncArrowWriter;
use parquet::arrow::async_writer::ParquetObjectWriter;
use parquet::file::properties::WriterProperties;
use uuid::Uuid;

use crate::conf::{Compression, StorageConfig};
use crate::core::SyncError;
use crate::refresh::RefreshMode;

use super::partition::split_partitions;
use super::{Destination, TableStore, WriteSummary, create_store};

/// TableStore over any `object_store` backend, writing Parquet through
/// `AsyncArrowWriter`.
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    compression: Compression,
    max_concurrency: usize,
}

impl ObjectStoreGateway {
    pub fn new(store: Arc<dyn ObjectStore>, compression: Compression, max_concurrency: usize) -> Self {
        Self {
            store,
            compression,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, SyncError> {
        let store = create_store(config)?;
        Ok(Self::new(store, config.compression, config.max_concurrency))
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.into())
            .build()
    }

    async fn put_parquet(&self, batch: &RecordBatch, location: ObjectPath) -> Result<usize, SyncError> {
        let write_err =
            |e: parquet::errors::ParquetError| SyncError::WriteError(format!("writing {}: {}", location, e));

        let object_writer = ParquetObjectWriter::new(self.store.clone(), location.clone());
        let mut writer =
            AsyncArrowWriter::try_new(object_writer, batch.schema(), Some(self.writer_properties()))
                .map_err(write_err)?;
        writer.write(batch).await.map_err(write_err)?;
        writer.close().await.map_err(write_err)?;

        debug!("Wrote {} rows to {}", batch.num_rows(), location);
        Ok(batch.num_rows())
    }

    async fn list_prefix(&self, prefix: &ObjectPath) -> Result<Vec<ObjectMeta>, object_store::Error> {
        match self.store.list(Some(prefix)).try_collect::<Vec<_>>().await {
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn delete_prefix(&self, prefix: &ObjectPath) -> Result<usize, SyncError> {
        let objects = self
            .list_prefix(prefix)
            .await
            .map_err(|e| SyncError::WriteError(format!("listing {}: {}", prefix, e)))?;

        for meta in &objects {
            self.store.delete(&meta.location).await.map_err(|e| {
                SyncError::WriteError(format!("deleting {}: {}", meta.location, e))
            })?;
        }

        if !objects.is_empty() {
            debug!("Deleted {} objects under {}", objects.len(), prefix);
        }
        Ok(objects.len())
    }

    async fn write_dataset(
        &self,
        batch: &RecordBatch,
        prefix: &str,
        mode: RefreshMode,
        partition_cols: &[String],
    ) -> Result<WriteSummary, SyncError> {
        let prefix = ObjectPath::from(prefix);
        let parts = split_partitions(batch, partition_cols)?;

        // Without partition columns there is nothing to merge by, so the
        // whole prefix is replaced.
        if mode == RefreshMode::Overwrite || partition_cols.is_empty() {
            self.delete_prefix(&prefix).await?;
        } else {
            for part in &parts {
                self.delete_prefix(&part.path_under(&prefix)).await?;
            }
        }

        let writes: Vec<_> = parts
            .iter()
            .map(|part| {
                let location = part
                    .path_under(&prefix)
                    .child(format!("part-{}.parquet", Uuid::new_v4().simple()));
                self.put_parquet(&part.batch, location)
            })
            .collect();
        let written: Vec<usize> = stream::iter(writes)
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await?;

        Ok(WriteSummary {
            rows: written.iter().sum(),
            files: written.len(),
            partitions: parts
                .iter()
                .map(|p| p.key())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }
}

#[async_trait]
impl TableStore for ObjectStoreGateway {
    async fn exists(&self, prefix: &str) -> Result<bool, SyncError> {
        let prefix = ObjectPath::from(prefix);
        match self.store.list(Some(&prefix)).next().await {
            None => Ok(false),
            Some(Ok(_)) => Ok(true),
            Some(Err(object_store::Error::NotFound { .. })) => Ok(false),
            Some(Err(e)) => Err(SyncError::ModeResolutionError(format!(
                "listing {}: {}",
                prefix, e
            ))),
        }
    }

    async fn write(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        mode: RefreshMode,
        partition_cols: &[String],
    ) -> Result<WriteSummary, SyncError> {
        let summary = match destination {
            Destination::Dataset(prefix) => {
                self.write_dataset(batch, prefix, mode, partition_cols).await?
            }
            Destination::File(path) => {
                let rows = self.put_parquet(batch, ObjectPath::from(path.as_str())).await?;
                WriteSummary {
                    rows,
                    files: 1,
                    partitions: Vec::new(),
                }
            }
        };

        info!(
            "Wrote {} rows in {} files to {} (mode {})",
            summary.rows, summary.files, destination, mode
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{object_keys, read_parquet, sample_batch};
    use bytes::Bytes;
    use object_store::PutPayload;
    use object_store::memory::InMemory;

    fn gateway() -> (ObjectStoreGateway, Arc<dyn ObjectStore>) {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        (ObjectStoreGateway::new(store.clone(), Compression::Gzip, 4), store)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_exists_reflects_store_contents() {
        let (gw, store) = gateway();
        assert!(!gw.exists("nasdaq/DS/T1").await.unwrap());

        store
            .put(
                &ObjectPath::from("nasdaq/DS/T1/yyyy=2024/part-0.parquet"),
                PutPayload::from(Bytes::from_static(b"x")),
            )
            .await
            .unwrap();
        assert!(gw.exists("nasdaq/DS/T1").await.unwrap());
        // Prefix matching is per path segment.
        assert!(!gw.exists("nasdaq/DS/T").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_single_file() {
        let (gw, store) = gateway();
        let batch = sample_batch(3);
        let dest = Destination::File("nasdaq/DS/T2/T2.parquet".to_string());

        let summary = gw.write(&batch, &dest, RefreshMode::Overwrite, &[]).await.unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.files, 1);
        assert_eq!(object_keys(&store, "nasdaq").await, vec!["nasdaq/DS/T2/T2.parquet"]);
        let read = read_parquet(&store, "nasdaq/DS/T2/T2.parquet").await;
        assert_eq!(read.num_rows(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_prefix() {
        let (gw, store) = gateway();
        let dest = Destination::Dataset("nasdaq/DS/T1".to_string());
        let by_ticker = cols(&["ticker"]);

        gw.write(&sample_batch(2), &dest, RefreshMode::Overwrite, &by_ticker)
            .await
            .unwrap();
        assert_eq!(object_keys(&store, "nasdaq/DS/T1").await.len(), 2);

        let one = sample_batch(1);
        gw.write(&one, &dest, RefreshMode::Overwrite, &by_ticker)
            .await
            .unwrap();
        let keys = object_keys(&store, "nasdaq/DS/T1").await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("nasdaq/DS/T1/ticker=T0/part-"));
    }

    #[tokio::test]
    async fn test_overwrite_partitions_keeps_untouched_partitions() {
        let (gw, store) = gateway();
        let dest = Destination::Dataset("nasdaq/DS/T1".to_string());
        let by_ticker = cols(&["ticker"]);

        gw.write(&sample_batch(3), &dest, RefreshMode::Overwrite, &by_ticker)
            .await
            .unwrap();
        let summary = gw
            .write(&sample_batch(1), &dest, RefreshMode::OverwritePartitions, &by_ticker)
            .await
            .unwrap();
        assert_eq!(summary.partitions, vec!["ticker=T0"]);

        let keys = object_keys(&store, "nasdaq/DS/T1").await;
        assert_eq!(keys.len(), 3);
        assert_eq!(keys.iter().filter(|k| k.contains("ticker=T0/")).count(), 1);
        assert_eq!(keys.iter().filter(|k| k.contains("ticker=T2/")).count(), 1);
    }

    #[tokio::test]
    async fn test_partition_columns_dropped_from_files() {
        let (gw, store) = gateway();
        let dest = Destination::Dataset("nasdaq/DS/T1".to_string());

        gw.write(&sample_batch(1), &dest, RefreshMode::Overwrite, &cols(&["ticker"]))
            .await
            .unwrap();
        let key = object_keys(&store, "nasdaq/DS/T1").await.remove(0);
        let read = read_parquet(&store, &key).await;
        assert!(read.schema().index_of("ticker").is_err());
        assert!(read.schema().index_of("close").is_ok());
    }
}

//! Test utilities: in-memory collaborators and fixture builders.
//!
//! This module is only available in unit tests or when the `testutil`
//! feature is enabled.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use zip::write::SimpleFileOptions;

use crate::conf::{ColumnSpec, Compression, DType, TableSpec};
use crate::core::SyncError;
use crate::fetch::{DataFetcher, RowFilter};
use crate::refresh::RefreshMode;
use crate::store::{Destination, ObjectStoreGateway, TableStore, WriteSummary};

/// Builds a table spec; an empty `update_field` makes it a full-refresh table.
pub fn table_spec(
    name: &str,
    update_field: &str,
    partition_cols: &[&str],
    schema: &[(&str, DType)],
) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        update_field: update_field.to_string(),
        partition_cols: partition_cols.iter().map(|c| c.to_string()).collect(),
        schema: schema
            .iter()
            .map(|(name, dtype)| ColumnSpec {
                name: name.to_string(),
                dtype: *dtype,
            })
            .collect(),
    }
}

/// `n` rows of `ticker` ("T0", "T1", ...) and `close` (0.0, 1.5, ...).
pub fn sample_batch(n: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ticker", DataType::Utf8, true),
        Field::new("close", DataType::Float64, true),
    ]));
    let tickers: Vec<String> = (0..n).map(|i| format!("T{}", i)).collect();
    let closes: Vec<f64> = (0..n).map(|i| i as f64 * 1.5).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(tickers)) as ArrayRef,
            Arc::new(Float64Array::from(closes)) as ArrayRef,
        ],
    )
    .unwrap()
}

/// Raw rows as the API returns them: one quote per date, all strings except
/// `close`, `lastupdated` set to the first date.
pub fn quote_batch(dates: &[&str]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ticker", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, true),
        Field::new("close", DataType::Float64, true),
        Field::new("lastupdated", DataType::Utf8, true),
    ]));
    let updated = dates.first().copied().unwrap_or("2024-03-01");
    let tickers: Vec<&str> = dates
        .iter()
        .enumerate()
        .map(|(i, _)| if i % 2 == 0 { "AAPL" } else { "MSFT" })
        .collect();
    let closes: Vec<f64> = (0..dates.len()).map(|i| 100.0 + i as f64).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(tickers)) as ArrayRef,
            Arc::new(StringArray::from(dates.to_vec())) as ArrayRef,
            Arc::new(Float64Array::from(closes)) as ArrayRef,
            Arc::new(StringArray::from(vec![updated; dates.len()])) as ArrayRef,
        ],
    )
    .unwrap()
}

/// A zip archive holding one member `name` with `content`.
pub fn zip_csv(name: &str, content: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Sorted keys of every object under `prefix`.
pub async fn object_keys(store: &Arc<dyn ObjectStore>, prefix: &str) -> Vec<String> {
    let prefix = ObjectPath::from(prefix);
    let mut keys: Vec<String> = store
        .list(Some(&prefix))
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await
        .unwrap();
    keys.sort();
    keys
}

/// Reads one Parquet object back into a single batch.
pub async fn read_parquet(store: &Arc<dyn ObjectStore>, key: &str) -> RecordBatch {
    let data: Bytes = store
        .get(&ObjectPath::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(data).unwrap();
    let schema = builder.schema().clone();
    let batches = builder
        .build()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    concat_batches(&schema, &batches).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    GetTable {
        table: String,
        column: String,
        value: String,
    },
    ExportTable {
        table: String,
    },
}

/// Scripted `DataFetcher`: serves canned rows and archives per table and
/// records every call.
#[derive(Default)]
pub struct FakeFetcher {
    rows: HashMap<String, RecordBatch>,
    exports: HashMap<String, Vec<u8>>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<FetchCall>>,
    export_paths: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, table: &str, batch: RecordBatch) -> Self {
        self.rows.insert(table.to_string(), batch);
        self
    }

    pub fn with_export(mut self, table: &str, archive: Vec<u8>) -> Self {
        self.exports.insert(table.to_string(), archive);
        self
    }

    pub fn with_failure(mut self, table: &str, message: &str) -> Self {
        self.failures.insert(table.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn export_paths(&self) -> Vec<PathBuf> {
        self.export_paths.lock().unwrap().clone()
    }

    fn check_failure(&self, table: &str) -> Result<(), SyncError> {
        match self.failures.get(table) {
            Some(message) => Err(SyncError::FetchError(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataFetcher for FakeFetcher {
    async fn get_table(&self, table: &str, filter: &RowFilter) -> Result<RecordBatch, SyncError> {
        self.calls.lock().unwrap().push(FetchCall::GetTable {
            table: table.to_string(),
            column: filter.column.clone(),
            value: filter.value.clone(),
        });
        self.check_failure(table)?;
        self.rows
            .get(table)
            .cloned()
            .ok_or_else(|| SyncError::FetchError(format!("no rows scripted for {}", table)))
    }

    async fn export_table(&self, table: &str, destination: &Path) -> Result<(), SyncError> {
        self.calls.lock().unwrap().push(FetchCall::ExportTable {
            table: table.to_string(),
        });
        self.export_paths
            .lock()
            .unwrap()
            .push(destination.to_path_buf());
        self.check_failure(table)?;
        let archive = self
            .exports
            .get(table)
            .ok_or_else(|| SyncError::FetchError(format!("no export scripted for {}", table)))?;
        std::fs::write(destination, archive)?;
        Ok(())
    }
}

/// One successful `TableStore::write` seen by `MemoryStore`.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub destination: Destination,
    pub mode: RefreshMode,
    pub partition_cols: Vec<String>,
    pub rows: usize,
}

/// `ObjectStoreGateway` over an `InMemory` store, with injectable failures
/// and a log of writes.
pub struct MemoryStore {
    store: Arc<dyn ObjectStore>,
    gateway: ObjectStoreGateway,
    exists_error: Option<String>,
    failing_writes: Option<String>,
    writes: Mutex<Vec<WriteCall>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        Self {
            gateway: ObjectStoreGateway::new(store.clone(), Compression::Snappy, 4),
            store,
            exists_error: None,
            failing_writes: None,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every existence probe fails with `message`.
    pub fn failing_exists(message: &str) -> Self {
        Self {
            exists_error: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Writes whose destination contains `pattern` fail.
    pub fn fail_writes_to(self, pattern: &str) -> Self {
        Self {
            failing_writes: Some(pattern.to_string()),
            ..self
        }
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Puts a small placeholder object at `key`.
    pub async fn touch(&self, key: &str) {
        self.store
            .put(
                &ObjectPath::from(key),
                PutPayload::from(Bytes::from_static(b"placeholder")),
            )
            .await
            .unwrap();
    }

    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        object_keys(&self.store, prefix).await
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn exists(&self, prefix: &str) -> Result<bool, SyncError> {
        if let Some(message) = &self.exists_error {
            return Err(SyncError::ModeResolutionError(format!(
                "listing {}: {}",
                prefix, message
            )));
        }
        self.gateway.exists(prefix).await
    }

    async fn write(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        mode: RefreshMode,
        partition_cols: &[String],
    ) -> Result<WriteSummary, SyncError> {
        if let Some(pattern) = &self.failing_writes {
            if destination.path().contains(pattern.as_str()) {
                return Err(SyncError::WriteError(format!(
                    "writing {}: injected failure",
                    destination
                )));
            }
        }
        let summary = self
            .gateway
            .write(batch, destination, mode, partition_cols)
            .await?;
        self.writes.lock().unwrap().push(WriteCall {
            destination: destination.clone(),
            mode,
            partition_cols: partition_cols.to_vec(),
            rows: batch.num_rows(),
        });
        Ok(summary)
    }
}

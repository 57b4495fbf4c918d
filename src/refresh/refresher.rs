use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use log::info;

use crate::conf::TableSpec;
use crate::core::{DATE_FORMAT, SyncError};
use crate::fetch::{RowFilter, read_export_archive};
use crate::store::{Destination, WriteSummary};

use super::context::SyncContext;
use super::mode::{RefreshMode, destination_for, resolve_mode};
use super::transform::transform;

/// Per-run state of one table: created by `fetch`, consumed by `write`.
#[derive(Debug, Clone)]
pub struct TableState {
    pub mode: RefreshMode,
    pub destination: Destination,
    pub rows: RecordBatch,
    pub partition_cols: Vec<String>,
}

/// What a successful refresh did.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub mode: RefreshMode,
    pub destination: Destination,
    pub rows_fetched: usize,
    pub write: Option<WriteSummary>,
}

/// Refresh cycle of one table of a dataset.
pub struct TableRefresher<'a> {
    ctx: &'a SyncContext,
    spec: &'a TableSpec,
    name: String,
    destination: Destination,
    mode: RefreshMode,
}

impl<'a> TableRefresher<'a> {
    /// Derives the destination and resolves the refresh mode; a failed
    /// existence probe fails construction.
    pub async fn new(
        ctx: &'a SyncContext,
        dataset: &str,
        spec: &'a TableSpec,
    ) -> Result<TableRefresher<'a>, SyncError> {
        let destination = destination_for(&ctx.root_prefix, dataset, spec);
        let mode = resolve_mode(spec, &destination, ctx.store.as_ref()).await?;
        Ok(Self {
            ctx,
            spec,
            name: format!("{}/{}", dataset, spec.name),
            destination,
            mode,
        })
    }

    /// Qualified table name, `DATASET/table`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub async fn fetch(&self, date: NaiveDate) -> Result<TableState, SyncError> {
        let rows = if self.spec.is_incremental() {
            info!("Downloading new rows for: {} ...", self.name);
            let filter = RowFilter {
                column: self.spec.update_field.clone(),
                value: date.format(DATE_FORMAT).to_string(),
            };
            self.ctx.fetcher.get_table(&self.name, &filter).await?
        } else {
            info!("Downloading table extract: {} ...", self.name);
            self.fetch_export().await?
        };
        info!("Fetched {} rows: {}.", rows.num_rows(), self.name);

        Ok(TableState {
            mode: self.mode,
            destination: self.destination.clone(),
            rows,
            partition_cols: self.spec.partition_cols.clone(),
        })
    }

    async fn fetch_export(&self) -> Result<RecordBatch, SyncError> {
        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new()
            .prefix("linksync-")
            .tempdir_in(&self.ctx.work_dir)
            .map_err(|e| {
                SyncError::IoError(format!(
                    "creating scratch dir in {}: {}",
                    self.ctx.work_dir.display(),
                    e
                ))
            })?;
        let archive = scratch
            .path()
            .join(format!("{}.zip", self.name.replace('/', ".")));

        self.ctx.fetcher.export_table(&self.name, &archive).await?;

        let path = archive.clone();
        let declared = self.spec.schema.clone();
        tokio::task::spawn_blocking(move || read_export_archive(&path, &declared))
            .await
            .map_err(|e| SyncError::FetchError(format!("reading {}: {}", archive.display(), e)))?
    }

    pub fn transform(&self, state: TableState) -> Result<TableState, SyncError> {
        let out = transform(state.rows, self.spec)?;
        Ok(TableState {
            rows: out.batch,
            partition_cols: out.partition_cols,
            ..state
        })
    }

    pub async fn write(&self, state: &TableState) -> Result<WriteSummary, SyncError> {
        info!("Uploading {}...", self.name);
        let partition_cols: &[String] = match state.destination {
            Destination::Dataset(_) => &state.partition_cols,
            Destination::File(_) => &[],
        };
        let summary = self
            .ctx
            .store
            .write(&state.rows, &state.destination, state.mode, partition_cols)
            .await?;
        info!("Finished updating {}.", self.name);
        Ok(summary)
    }

    /// Fetch, transform and write for `date`; the first failing stage ends
    /// the refresh.
    pub async fn refresh(&self, date: NaiveDate) -> Result<RefreshSummary, SyncError> {
        let state = self.fetch(date).await?;
        let rows_fetched = state.rows.num_rows();
        let state = self.transform(state)?;

        // An empty pull must not wipe an incremental destination.
        let write = if rows_fetched == 0 && self.spec.is_incremental() {
            info!("No new rows for {} on {}; nothing to upload.", self.name, date);
            None
        } else {
            Some(self.write(&state).await?)
        };

        Ok(RefreshSummary {
            mode: self.mode,
            destination: self.destination.clone(),
            rows_fetched,
            write,
        })
    }
}

use std::collections::HashMap;

use arrow::array::{Array, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use object_store::path::Path as ObjectPath;

use crate::core::SyncError;

/// Hive's directory name for rows whose partition value is null.
pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Rows sharing one combination of partition values, with the partition
/// columns themselves removed.
#[derive(Debug, Clone)]
pub struct PartitionBatch {
    pub values: Vec<(String, String)>,
    pub batch: RecordBatch,
}

impl PartitionBatch {
    /// `yyyy=2024/mm=3/dd=1` style key, empty for an unpartitioned batch.
    pub fn key(&self) -> String {
        self.values
            .iter()
            .map(|(col, value)| format!("{col}={value}"))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Directory of this partition below `prefix`.
    pub fn path_under(&self, prefix: &ObjectPath) -> ObjectPath {
        self.values
            .iter()
            .fold(prefix.clone(), |path, (col, value)| {
                path.child(format!("{col}={value}"))
            })
    }
}

/// Splits `batch` into one batch per distinct combination of `partition_cols`
/// values, in order of first appearance.
pub fn split_partitions(
    batch: &RecordBatch,
    partition_cols: &[String],
) -> Result<Vec<PartitionBatch>, SyncError> {
    if partition_cols.is_empty() {
        return Ok(vec![PartitionBatch {
            values: Vec::new(),
            batch: batch.clone(),
        }]);
    }

    let schema = batch.schema();
    let key_indices = partition_cols
        .iter()
        .map(|col| {
            schema.index_of(col).map_err(|_| {
                SyncError::WriteError(format!("partition column '{}' not found in rows", col))
            })
        })
        .collect::<Result<Vec<usize>, SyncError>>()?;

    let keep: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !key_indices.contains(i))
        .collect();
    let projected = batch
        .project(&keep)
        .map_err(|e| SyncError::WriteError(e.to_string()))?;

    let options = FormatOptions::default();
    let key_arrays: Vec<&dyn Array> = key_indices
        .iter()
        .map(|&i| batch.column(i).as_ref())
        .collect();
    let formatters = key_arrays
        .iter()
        .map(|array| ArrayFormatter::try_new(*array, &options))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SyncError::WriteError(e.to_string()))?;

    let mut groups: Vec<(Vec<String>, Vec<u32>)> = Vec::new();
    let mut lookup: HashMap<Vec<String>, usize> = HashMap::new();

    for row in 0..batch.num_rows() {
        let values: Vec<String> = key_arrays
            .iter()
            .zip(&formatters)
            .map(|(array, formatter)| {
                if array.is_null(row) {
                    NULL_PARTITION.to_string()
                } else {
                    formatter.value(row).to_string()
                }
            })
            .collect();

        match lookup.get(&values) {
            Some(&slot) => groups[slot].1.push(row as u32),
            None => {
                lookup.insert(values.clone(), groups.len());
                groups.push((values, vec![row as u32]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(values, rows)| {
            let indices = UInt32Array::from(rows);
            let part = take_record_batch(&projected, &indices)
                .map_err(|e| SyncError::WriteError(e.to_string()))?;
            Ok(PartitionBatch {
                values: partition_cols.iter().cloned().zip(values).collect(),
                batch: part,
            })
        })
        .collect()
}

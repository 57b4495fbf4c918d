use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, FieldRef, Schema};
use arrow::record_batch::RecordBatch;
use log::debug;
use zip::ZipArchive;

use crate::conf::ColumnSpec;
use crate::core::SyncError;

const CSV_BATCH_SIZE: usize = 8192;

fn export_err(path: &Path, what: &str, err: impl std::fmt::Display) -> SyncError {
    SyncError::FetchError(format!("{} {}: {}", what, path.display(), err))
}

/// Reads a bulk export: a zip archive holding one CSV file with a header row.
///
/// The CSV member is unpacked next to the archive (`<archive>.csv`) so the
/// caller's scratch directory owns every byte written here. Columns listed in
/// `declared` are read as text and left for the schema cast; inference only
/// types the rest.
pub fn read_export_archive(
    archive_path: &Path,
    declared: &[ColumnSpec],
) -> Result<RecordBatch, SyncError> {
    let archive_file =
        File::open(archive_path).map_err(|e| export_err(archive_path, "opening", e))?;
    let mut archive = ZipArchive::new(archive_file)?;

    let member = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|f| f.is_file() && f.name().to_ascii_lowercase().ends_with(".csv"))
                .unwrap_or(false)
        })
        .ok_or_else(|| export_err(archive_path, "reading", "archive has no CSV member"))?;

    let csv_path = archive_path.with_extension("csv");
    let mut csv_file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&csv_path)
        .map_err(|e| export_err(&csv_path, "creating", e))?;
    {
        let mut entry = archive.by_index(member)?;
        debug!("Unpacking {} from {}", entry.name(), archive_path.display());
        std::io::copy(&mut entry, &mut csv_file)
            .map_err(|e| export_err(&csv_path, "unpacking", e))?;
    }

    csv_file
        .seek(SeekFrom::Start(0))
        .map_err(|e| export_err(&csv_path, "rewinding", e))?;
    let format = Format::default().with_header(true);
    let (schema, records) = format
        .infer_schema(&mut csv_file, None)
        .map_err(|e| export_err(&csv_path, "inferring schema of", e))?;
    let fields: Vec<FieldRef> = schema
        .fields()
        .iter()
        .map(|field| {
            if declared.iter().any(|c| &c.name == field.name()) {
                Arc::new(field.as_ref().clone().with_data_type(DataType::Utf8))
            } else {
                field.clone()
            }
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));
    debug!("Inferred {} columns over {} records", schema.fields().len(), records);

    csv_file
        .seek(SeekFrom::Start(0))
        .map_err(|e| export_err(&csv_path, "rewinding", e))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(csv_file)
        .map_err(|e| export_err(&csv_path, "parsing", e))?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| export_err(&csv_path, "parsing", e))?;
    concat_batches(&schema, &batches).map_err(|e| export_err(&csv_path, "parsing", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::DType;
    use crate::testutil::zip_csv;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use tempfile::TempDir;

    #[test]
    fn test_read_export_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("DS.T2.zip");
        let csv = "ticker,date,close,volume\nAAPL,2024-03-01,179.66,100\nMSFT,2024-03-01,,200\n";
        std::fs::write(&path, zip_csv("DS_T2.csv", csv)).unwrap();

        let batch = read_export_archive(&path, &[]).unwrap();

        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Date32);
        let close = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(close.value(0), 179.66);
        assert!(close.is_null(1));
        let volume = batch.column(3).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(volume.value(1), 200);
    }

    #[test]
    fn test_declared_columns_keep_leading_zeros() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("DS.TICKERS.zip");
        let csv = "ticker,cusip,siccode\nAAPL,037833100,3571\nMSFT,594918104,\n";
        std::fs::write(&path, zip_csv("DS_TICKERS.csv", csv)).unwrap();
        let declared = vec![ColumnSpec {
            name: "cusip".to_string(),
            dtype: DType::String,
        }];

        let batch = read_export_archive(&path, &declared).unwrap();

        let cusip = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(cusip.value(0), "037833100");
        // Undeclared columns are still typed by inference.
        assert_eq!(batch.schema().field(2).data_type(), &DataType::Int64);
        assert!(batch.column(2).is_null(1));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let err = read_export_archive(&path, &[]).unwrap_err();
        assert!(matches!(err, SyncError::FetchError(_)));
    }

    #[test]
    fn test_archive_without_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.zip");
        std::fs::write(&path, zip_csv("README.txt", "nothing here")).unwrap();

        let err = read_export_archive(&path, &[]).unwrap_err();
        assert!(matches!(err, SyncError::FetchError(msg) if msg.contains("no CSV member")));
    }
}

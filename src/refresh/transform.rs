use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::compute::kernels::temporal::{DatePart, date_part};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use log::{debug, warn};

use crate::conf::TableSpec;
use crate::core::SyncError;

/// Partition columns a date partition column is decomposed into.
pub const DATE_PARTITION_COLS: [&str; 3] = ["yyyy", "mm", "dd"];

const TIMESTAMP: DataType = DataType::Timestamp(TimeUnit::Nanosecond, None);

/// Rows after schema casts, with the partition columns to write them by.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub batch: RecordBatch,
    pub partition_cols: Vec<String>,
}

fn cast_strict(array: &ArrayRef, to: &DataType, column: &str) -> Result<ArrayRef, SyncError> {
    if array.data_type() == to {
        return Ok(array.clone());
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array.as_ref(), to, &options).map_err(|e| {
        SyncError::TransformError(format!(
            "casting column '{}' from {} to {}: {}",
            column,
            array.data_type(),
            to,
            e
        ))
    })
}

/// Applies the schema of `spec` to `batch`.
///
/// Columns are visited in schema order. The first `datetime` column that is
/// also a partition column becomes `yyyy`/`mm`/`dd` and those three replace
/// the partition columns. Other `datetime` columns are rendered as
/// `YYYY-MM-DD` strings, every remaining schema column is cast to its tag.
/// Columns outside the schema are left alone and `spec` is not modified.
pub fn transform(batch: RecordBatch, spec: &TableSpec) -> Result<Transformed, SyncError> {
    let source_schema = batch.schema();
    let mut fields: Vec<FieldRef> = source_schema.fields().iter().cloned().collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    let mut partition_cols = spec.partition_cols.clone();
    let mut decomposed: Option<&str> = None;

    for column in &spec.schema {
        let idx = fields
            .iter()
            .position(|f| f.name() == &column.name)
            .ok_or_else(|| {
                SyncError::TransformError(format!(
                    "column '{}' from the schema is missing in fetched rows",
                    column.name
                ))
            })?;
        let date_partition = column.dtype.is_temporal() && spec.is_partition_col(&column.name);

        if date_partition && decomposed.is_none() {
            let ts = cast_strict(&columns[idx], &TIMESTAMP, &column.name)?;
            let parts = [DatePart::Year, DatePart::Month, DatePart::Day]
                .into_iter()
                .map(|part| date_part(ts.as_ref(), part))
                .collect::<Result<Vec<ArrayRef>, _>>()
                .map_err(|e| {
                    SyncError::TransformError(format!(
                        "splitting column '{}' into date parts: {}",
                        column.name, e
                    ))
                })?;

            fields.remove(idx);
            columns.remove(idx);
            for (name, part) in DATE_PARTITION_COLS.into_iter().zip(parts) {
                if fields.iter().any(|f| f.name() == name) {
                    return Err(SyncError::TransformError(format!(
                        "column '{}' already exists; cannot decompose '{}'",
                        name, column.name
                    )));
                }
                fields.push(Arc::new(Field::new(name, DataType::Int32, true)));
                columns.push(part);
            }

            partition_cols = DATE_PARTITION_COLS.iter().map(|c| c.to_string()).collect();
            decomposed = Some(&column.name);
            debug!("Decomposed '{}' into yyyy/mm/dd", column.name);
        } else if column.dtype.is_temporal() {
            if let Some(first) = decomposed.filter(|_| date_partition) {
                warn!(
                    "'{}' is a second date partition column; '{}' already gives yyyy/mm/dd, \
                     writing '{}' as a date string",
                    column.name, first, column.name
                );
            }
            let ts = cast_strict(&columns[idx], &TIMESTAMP, &column.name)?;
            let day = cast_strict(&ts, &DataType::Date32, &column.name)?;
            columns[idx] = cast_strict(&day, &DataType::Utf8, &column.name)?;
            fields[idx] = Arc::new(fields[idx].as_ref().clone().with_data_type(DataType::Utf8));
        } else {
            debug!("Cast: {} to {:?}", column.name, column.dtype);
            let target = DataType::from(&column.dtype);
            columns[idx] = cast_strict(&columns[idx], &target, &column.name)?;
            fields[idx] = Arc::new(fields[idx].as_ref().clone().with_data_type(target));
        }
    }

    let schema = Arc::new(Schema::new_with_metadata(
        fields,
        source_schema.metadata().clone(),
    ));
    let batch = RecordBatch::try_new(schema, columns)
        .map_err(|e| SyncError::TransformError(e.to_string()))?;

    Ok(Transformed {
        batch,
        partition_cols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::DType;
    use crate::testutil::table_spec;
    use arrow::array::{Date32Array, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::Date32Type;
    use chrono::NaiveDate;

    fn raw_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("ticker", DataType::Utf8, true),
            Field::new("date", DataType::Utf8, true),
            Field::new("close", DataType::Utf8, true),
            Field::new("lastupdated", DataType::Date32, true),
            Field::new("extra", DataType::Utf8, true),
        ]));
        let updated = Date32Type::from_naive_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["AAPL", "MSFT"])),
                Arc::new(StringArray::from(vec!["2024-03-01", "2023-12-31"])),
                Arc::new(StringArray::from(vec!["179.66", "415.5"])),
                Arc::new(Date32Array::from(vec![updated, updated])),
                Arc::new(StringArray::from(vec!["x", "y"])),
            ],
        )
        .unwrap()
    }

    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
        let idx = batch.schema().index_of(name).unwrap();
        batch.column(idx).as_any().downcast_ref::<T>().unwrap()
    }

    #[test]
    fn test_date_partition_decomposed() {
        let spec = table_spec(
            "SEP",
            "lastupdated",
            &["date"],
            &[
                ("ticker", DType::String),
                ("date", DType::Datetime),
                ("close", DType::Float64),
            ],
        );
        let out = transform(raw_batch(), &spec).unwrap();

        assert_eq!(out.partition_cols, vec!["yyyy", "mm", "dd"]);
        assert!(out.batch.schema().index_of("date").is_err());
        let yyyy = column::<Int32Array>(&out.batch, "yyyy");
        let mm = column::<Int32Array>(&out.batch, "mm");
        let dd = column::<Int32Array>(&out.batch, "dd");
        assert_eq!((yyyy.value(0), mm.value(0), dd.value(0)), (2024, 3, 1));
        assert_eq!((yyyy.value(1), mm.value(1), dd.value(1)), (2023, 12, 31));
        // The spec itself is untouched.
        assert_eq!(spec.partition_cols, vec!["date"]);
    }

    #[test]
    fn test_non_partition_datetime_formatted() {
        let spec = table_spec(
            "SEP",
            "lastupdated",
            &[],
            &[("lastupdated", DType::Datetime), ("date", DType::Datetime)],
        );
        let out = transform(raw_batch(), &spec).unwrap();

        let updated = column::<StringArray>(&out.batch, "lastupdated");
        assert_eq!(updated.value(0), "2024-03-01");
        let date = column::<StringArray>(&out.batch, "date");
        assert_eq!(date.value(1), "2023-12-31");
        assert!(out.partition_cols.is_empty());
    }

    #[test]
    fn test_cast_and_passthrough() {
        let spec = table_spec("SEP", "", &[], &[("close", DType::Float64)]);
        let out = transform(raw_batch(), &spec).unwrap();

        let close = column::<Float64Array>(&out.batch, "close");
        assert_eq!(close.value(0), 179.66);
        let extra = column::<StringArray>(&out.batch, "extra");
        assert_eq!(extra.value(1), "y");
        assert_eq!(out.batch.num_columns(), 5);
    }

    #[test]
    fn test_non_date_partition_kept() {
        let spec = table_spec("SEP", "lastupdated", &["ticker"], &[("ticker", DType::String)]);
        let out = transform(raw_batch(), &spec).unwrap();
        assert_eq!(out.partition_cols, vec!["ticker"]);
        assert!(out.batch.schema().index_of("ticker").is_ok());
    }

    #[test]
    fn test_failed_cast_is_error() {
        let spec = table_spec("SEP", "", &[], &[("ticker", DType::Int64)]);
        let err = transform(raw_batch(), &spec).unwrap_err();
        assert!(matches!(err, SyncError::TransformError(msg) if msg.contains("'ticker'")));
    }

    #[test]
    fn test_missing_schema_column_is_error() {
        let spec = table_spec("SEP", "", &[], &[("volume", DType::Int64)]);
        let err = transform(raw_batch(), &spec).unwrap_err();
        assert!(matches!(err, SyncError::TransformError(msg) if msg.contains("'volume'")));
    }

    #[test]
    fn test_transform_is_idempotent() {
        let spec = table_spec(
            "SEP",
            "lastupdated",
            &[],
            &[
                ("close", DType::Float64),
                ("lastupdated", DType::Datetime),
                ("ticker", DType::String),
            ],
        );
        let once = transform(raw_batch(), &spec).unwrap();
        let twice = transform(once.batch.clone(), &spec).unwrap();
        assert_eq!(once.batch, twice.batch);
        assert_eq!(once.partition_cols, twice.partition_cols);
    }

    #[test]
    fn test_second_date_partition_formatted() {
        let spec = table_spec(
            "SEP",
            "lastupdated",
            &["date", "lastupdated"],
            &[("date", DType::Datetime), ("lastupdated", DType::Datetime)],
        );
        let out = transform(raw_batch(), &spec).unwrap();
        assert_eq!(out.partition_cols, vec!["yyyy", "mm", "dd"]);
        let updated = column::<StringArray>(&out.batch, "lastupdated");
        assert_eq!(updated.value(0), "2024-03-01");
    }

    #[test]
    fn test_int_cast() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Float64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Float64Array::from(vec![1.0, 2.0]))],
        )
        .unwrap();
        let spec = table_spec("T", "", &[], &[("v", DType::Int64)]);
        let out = transform(batch, &spec).unwrap();
        assert_eq!(column::<Int64Array>(&out.batch, "v").value(1), 2);
    }
}

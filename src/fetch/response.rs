use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::core::{DATE_FORMAT, SyncError};

/// Column header of a datatable page.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ColumnInfo {
    fn arrow_type(&self) -> DataType {
        let kind = self.kind.to_ascii_lowercase();
        if kind == "integer" || kind == "long" || kind == "int" {
            DataType::Int64
        } else if kind == "double" || kind == "float" || kind.starts_with("bigdecimal") {
            DataType::Float64
        } else if kind == "boolean" {
            DataType::Boolean
        } else if kind == "date" {
            DataType::Date32
        } else {
            DataType::Utf8
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TablePage {
    pub datatable: Datatable,
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Datatable {
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageMeta {
    #[serde(default)]
    pub next_cursor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportReply {
    pub datatable_bulk_download: BulkDownload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkDownload {
    pub file: ExportFile,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportFile {
    #[serde(default)]
    pub link: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReply {
    quandl_error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

/// Human readable message of an error response body.
pub(crate) fn api_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ApiErrorReply>(body) {
        Ok(reply) => format!("{} ({})", reply.quandl_error.message, reply.quandl_error.code),
        Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}

fn bad_value(column: &str, row: usize, value: &Value) -> SyncError {
    SyncError::FetchError(format!(
        "unexpected value {} in column '{}' row {}",
        value, column, row
    ))
}

/// Builds one RecordBatch out of datatable rows, typing each column from
/// its declared API type.
pub fn rows_to_batch(columns: &[ColumnInfo], rows: &[Vec<Value>]) -> Result<RecordBatch, SyncError> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(SyncError::FetchError(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for (c, column) in columns.iter().enumerate() {
        let dtype = column.arrow_type();
        let values = rows.iter().map(|row| &row[c]);
        let array: ArrayRef = match dtype {
            DataType::Int64 => {
                let mut b = Int64Builder::with_capacity(rows.len());
                for (r, v) in values.enumerate() {
                    match v {
                        Value::Null => b.append_null(),
                        Value::Number(n) => {
                            b.append_value(n.as_i64().ok_or_else(|| bad_value(&column.name, r, v))?)
                        }
                        Value::String(s) => b.append_value(
                            s.parse().map_err(|_| bad_value(&column.name, r, v))?,
                        ),
                        _ => return Err(bad_value(&column.name, r, v)),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(rows.len());
                for (r, v) in values.enumerate() {
                    match v {
                        Value::Null => b.append_null(),
                        Value::Number(n) => {
                            b.append_value(n.as_f64().ok_or_else(|| bad_value(&column.name, r, v))?)
                        }
                        Value::String(s) => b.append_value(
                            s.parse().map_err(|_| bad_value(&column.name, r, v))?,
                        ),
                        _ => return Err(bad_value(&column.name, r, v)),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Boolean => {
                let mut b = BooleanBuilder::with_capacity(rows.len());
                for (r, v) in values.enumerate() {
                    match v {
                        Value::Null => b.append_null(),
                        Value::Bool(x) => b.append_value(*x),
                        _ => return Err(bad_value(&column.name, r, v)),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Date32 => {
                let mut b = Date32Builder::with_capacity(rows.len());
                for (r, v) in values.enumerate() {
                    match v {
                        Value::Null => b.append_null(),
                        Value::String(s) => {
                            let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
                                .map_err(|_| bad_value(&column.name, r, v))?;
                            b.append_value(Date32Type::from_naive_date(date));
                        }
                        _ => return Err(bad_value(&column.name, r, v)),
                    }
                }
                Arc::new(b.finish())
            }
            _ => {
                let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
                for v in values {
                    match v {
                        Value::Null => b.append_null(),
                        Value::String(s) => b.append_value(s),
                        other => b.append_value(other.to_string()),
                    }
                }
                Arc::new(b.finish())
            }
        };
        fields.push(Field::new(&column.name, dtype, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    RecordBatch::try_new(schema, arrays).map_err(|e| SyncError::FetchError(e.to_string()))
}

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::{DataType, TimeUnit};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

/// Column type tag as written in a dataset spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum DType {
    String,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Datetime,
}

impl DType {
    pub fn is_temporal(&self) -> bool {
        matches!(self, DType::Datetime)
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "object" | "utf8" => Ok(DType::String),
            "int32" => Ok(DType::Int32),
            "int64" | "int" => Ok(DType::Int64),
            "float32" => Ok(DType::Float32),
            "float64" | "float" | "double" => Ok(DType::Float64),
            "bool" | "boolean" => Ok(DType::Bool),
            "datetime" | "datetime64[ns]" | "date" | "timestamp" => Ok(DType::Datetime),
            other => Err(format!("unknown column type '{other}'")),
        }
    }
}

impl TryFrom<String> for DType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<&DType> for DataType {
    fn from(dtype: &DType) -> Self {
        match dtype {
            DType::String => DataType::Utf8,
            DType::Int32 => DataType::Int32,
            DType::Int64 => DataType::Int64,
            DType::Float32 => DataType::Float32,
            DType::Float64 => DataType::Float64,
            DType::Bool => DataType::Boolean,
            DType::Datetime => DataType::Timestamp(TimeUnit::Nanosecond, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: DType,
}

/// One table entry of a dataset spec file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    #[serde(skip)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub update_field: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub partition_cols: Vec<String>,
    #[serde(default, deserialize_with = "ordered_columns")]
    pub schema: Vec<ColumnSpec>,
}

impl TableSpec {
    /// A watermark column means rows are pulled per date and merged by partition.
    pub fn is_incremental(&self) -> bool {
        !self.update_field.trim().is_empty()
    }

    pub fn is_partition_col(&self, column: &str) -> bool {
        self.partition_cols.iter().any(|c| c == column)
    }
}

/// Tables of a dataset spec, in the order they are declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSpecs(pub Vec<TableSpec>);

impl<'de> Deserialize<'de> for TableSpecs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TablesVisitor;

        impl<'de> Visitor<'de> for TablesVisitor {
            type Value = TableSpecs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of table name to table spec")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(TableSpecs::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut tables: Vec<TableSpec> = Vec::new();
                while let Some((name, mut spec)) = map.next_entry::<String, TableSpec>()? {
                    if tables.iter().any(|t| t.name == name) {
                        return Err(de::Error::custom(format!("duplicate table '{name}'")));
                    }
                    spec.name = name;
                    tables.push(spec);
                }
                Ok(TableSpecs(tables))
            }
        }

        deserializer.deserialize_any(TablesVisitor)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn ordered_columns<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ColumnSpec>, D::Error> {
    struct ColumnsVisitor;

    impl<'de> Visitor<'de> for ColumnsVisitor {
        type Value = Vec<ColumnSpec>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of column name to type tag")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut columns: Vec<ColumnSpec> = Vec::new();
            while let Some((name, dtype)) = map.next_entry::<String, DType>()? {
                if columns.iter().any(|c| c.name == name) {
                    return Err(de::Error::custom(format!("duplicate column '{name}'")));
                }
                columns.push(ColumnSpec { name, dtype });
            }
            Ok(columns)
        }
    }

    deserializer.deserialize_any(ColumnsVisitor)
}

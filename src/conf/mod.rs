mod api;
mod config;
mod storage;
mod table;

pub use api::ApiConfig;
pub use config::Config;
pub use storage::{Compression, StorageConfig};
pub use table::{ColumnSpec, DType, TableSpec, TableSpecs};

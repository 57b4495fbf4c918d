use std::fmt;

use log::debug;

use crate::conf::TableSpec;
use crate::core::SyncError;
use crate::store::{Destination, TableStore};

/// How a write treats data already at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Replace everything at the destination.
    Overwrite,
    /// Replace only the partitions present in the new rows.
    OverwritePartitions,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshMode::Overwrite => f.write_str("overwrite"),
            RefreshMode::OverwritePartitions => f.write_str("overwrite_partitions"),
        }
    }
}

/// Destination of `spec` inside dataset `dataset`, below `root_prefix`.
///
/// Incremental tables own the directory `{root}/{DATASET}/{table}`; full
/// tables are the single object `{root}/{DATASET}/{table}/{table}.parquet`.
pub fn destination_for(root_prefix: &str, dataset: &str, spec: &TableSpec) -> Destination {
    let root = root_prefix.trim_matches('/');
    let qualified = format!("{}/{}", dataset, spec.name);
    let dir = if root.is_empty() {
        qualified
    } else {
        format!("{}/{}", root, qualified)
    };

    if spec.is_incremental() {
        Destination::Dataset(dir)
    } else {
        let basename = spec.name.rsplit('/').next().unwrap_or(&spec.name);
        Destination::File(format!("{}/{}.parquet", dir, basename))
    }
}

/// Incremental tables merge into an existing destination and are recreated
/// when nothing is there yet; full tables always overwrite.
pub async fn resolve_mode(
    spec: &TableSpec,
    destination: &Destination,
    store: &dyn TableStore,
) -> Result<RefreshMode, SyncError> {
    if !spec.is_incremental() {
        debug!("No update field for {}; using overwrite", spec.name);
        return Ok(RefreshMode::Overwrite);
    }

    debug!(
        "Found update field '{}' for {}; checking {}",
        spec.update_field, spec.name, destination
    );
    if store.exists(destination.path()).await? {
        debug!("{} exists; using overwrite_partitions", destination);
        Ok(RefreshMode::OverwritePartitions)
    } else {
        debug!("{} is empty; re-creating table", destination);
        Ok(RefreshMode::Overwrite)
    }
}

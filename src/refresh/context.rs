use std::path::PathBuf;
use std::sync::Arc;

use crate::conf::Config;
use crate::core::SyncError;
use crate::fetch::{DataFetcher, DataLinkClient};
use crate::store::{ObjectStoreGateway, TableStore};

/// Collaborators shared by every table of a run.
#[derive(Clone)]
pub struct SyncContext {
    pub fetcher: Arc<dyn DataFetcher>,
    pub store: Arc<dyn TableStore>,
    /// Prefix every destination lives under, e.g. `nasdaq`.
    pub root_prefix: String,
    /// Scratch space for export archives.
    pub work_dir: PathBuf,
}

impl SyncContext {
    pub fn new(
        fetcher: Arc<dyn DataFetcher>,
        store: Arc<dyn TableStore>,
        root_prefix: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            store,
            root_prefix: root_prefix.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let fetcher = DataLinkClient::new(&config.api)?;
        let store = ObjectStoreGateway::from_config(&config.storage)?;
        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(store),
            config.storage.prefix.clone(),
            config.work_dir.clone(),
        ))
    }
}

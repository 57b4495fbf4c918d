use std::path::PathBuf;

use log::info;

use crate::core::SyncError;
use crate::refresh::RefreshSummary;

/// Result of refreshing one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOutcome {
    /// Qualified name, `DATASET/table`.
    pub table: String,
    pub result: Result<RefreshSummary, SyncError>,
}

impl TableOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub dataset: String,
    pub outcomes: Vec<TableOutcome>,
}

impl DatasetReport {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Everything one invocation did, for the caller to judge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub datasets: Vec<DatasetReport>,
    /// Spec files that could not be loaded.
    pub load_failures: Vec<(PathBuf, SyncError)>,
}

impl RunReport {
    pub fn tables_succeeded(&self) -> usize {
        self.datasets.iter().map(|d| d.succeeded()).sum()
    }

    pub fn tables_failed(&self) -> usize {
        self.datasets.iter().map(|d| d.failed().count()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.tables_failed() > 0 || !self.load_failures.is_empty()
    }

    /// Qualified names of failed tables, in run order.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.datasets
            .iter()
            .flat_map(|d| d.failed())
            .map(|o| o.table.as_str())
            .collect()
    }

    /// Failures were logged as they happened; this only counts them.
    pub fn log_summary(&self) {
        let failed = self.failed_tables();
        if !failed.is_empty() {
            info!("Failed tables: {}.", failed.join(", "));
        }
        info!(
            "Run finished: {} datasets, {} tables updated, {} tables failed, {} specs skipped.",
            self.datasets.len(),
            self.tables_succeeded(),
            self.tables_failed(),
            self.load_failures.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshMode;
    use crate::store::Destination;

    fn ok(table: &str) -> TableOutcome {
        TableOutcome {
            table: table.to_string(),
            result: Ok(RefreshSummary {
                mode: RefreshMode::Overwrite,
                destination: Destination::Dataset(format!("nasdaq/{}", table)),
                rows_fetched: 1,
                write: None,
            }),
        }
    }

    fn failed(table: &str) -> TableOutcome {
        TableOutcome {
            table: table.to_string(),
            result: Err(SyncError::FetchError("down".to_string())),
        }
    }

    #[test]
    fn test_run_report_counts() {
        let mut ds = DatasetReport::new("DS");
        ds.outcomes = vec![ok("DS/A"), failed("DS/B"), ok("DS/C")];
        let report = RunReport {
            datasets: vec![ds],
            load_failures: Vec::new(),
        };

        assert_eq!(report.tables_succeeded(), 2);
        assert_eq!(report.tables_failed(), 1);
        assert_eq!(report.failed_tables(), vec!["DS/B"]);
        assert!(report.has_failures());
    }

    #[test]
    fn test_load_failure_counts_as_failure() {
        let report = RunReport {
            datasets: Vec::new(),
            load_failures: vec![(
                PathBuf::from("schemas/bad.yaml"),
                SyncError::ConfigError("bad".to_string()),
            )],
        };
        assert!(report.has_failures());
        assert_eq!(report.tables_failed(), 0);
        assert_eq!(report.clone(), report);
    }
}

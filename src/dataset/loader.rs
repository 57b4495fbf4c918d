use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{error, info};

use crate::conf::{TableSpec, TableSpecs};
use crate::core::SyncError;
use crate::refresh::{RefreshSummary, SyncContext, TableRefresher};

use super::report::{DatasetReport, RunReport, TableOutcome};

/// Tables of one spec file, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    tables: Vec<TableSpec>,
}

/// Uppercased file stem: `schemas/sharadar.yaml` -> `SHARADAR`.
pub fn dataset_name(path: &Path) -> Result<String, SyncError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
        .ok_or_else(|| {
            SyncError::ConfigError(format!("cannot derive a dataset name from {}", path.display()))
        })
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Dataset, SyncError> {
        let name = dataset_name(path)?;
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigError(format!("reading {}: {}", path.display(), e)))?;
        let dataset = Self::from_str(&name, &text)
            .map_err(|e| SyncError::ConfigError(format!("{}: {}", path.display(), e)))?;

        info!(
            "Loaded {} tables: {}.",
            dataset.tables.len(),
            dataset
                .tables
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!("Dataset name: {}.", dataset.name);
        Ok(dataset)
    }

    pub fn from_str(name: &str, yaml: &str) -> Result<Dataset, SyncError> {
        let TableSpecs(tables) = serde_yaml::from_str(yaml)?;
        Ok(Dataset {
            name: name.to_uppercase(),
            tables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    async fn refresh_table(
        &self,
        ctx: &SyncContext,
        spec: &TableSpec,
        as_of: NaiveDate,
    ) -> Result<RefreshSummary, SyncError> {
        let refresher = TableRefresher::new(ctx, &self.name, spec).await?;
        refresher.refresh(as_of).await
    }

    /// Refreshes every table for `as_of`. A failing table is logged and
    /// recorded; the remaining tables still run.
    pub async fn update_tables(&self, ctx: &SyncContext, as_of: NaiveDate) -> DatasetReport {
        let mut report = DatasetReport::new(&self.name);

        for spec in &self.tables {
            let table = format!("{}/{}", self.name, spec.name);
            let result = self.refresh_table(ctx, spec, as_of).await;
            if let Err(err) = &result {
                error!("Failed to refresh {}: {}", table, err);
            }
            report.outcomes.push(TableOutcome { table, result });
        }

        report
    }
}

/// YAML spec files directly inside `dir`, sorted by path.
pub fn discover_spec_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        SyncError::ConfigError(format!("reading schemas dir {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Loads and refreshes each spec file in turn. A file that fails to load is
/// recorded and skipped.
pub async fn run_datasets(ctx: &SyncContext, files: &[PathBuf], as_of: NaiveDate) -> RunReport {
    let mut report = RunReport::default();

    for path in files {
        match Dataset::load(path) {
            Ok(dataset) => {
                let dataset_report = dataset.update_tables(ctx, as_of).await;
                report.datasets.push(dataset_report);
            }
            Err(err) => {
                error!("Failed to load {}: {}", path.display(), err);
                report.load_failures.push((path.clone(), err));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dataset_name() {
        assert_eq!(
            dataset_name(Path::new("/schemas/sharadar.yaml")).unwrap(),
            "SHARADAR"
        );
        assert_eq!(dataset_name(Path::new("zacks.yml")).unwrap(), "ZACKS");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sharadar.yaml");
        std::fs::write(
            &path,
            "SEP:\n  update_field: lastupdated\n  partition_cols: [date]\n  schema:\n    date: datetime\nTICKERS:\n  update_field: ''\n",
        )
        .unwrap();

        let dataset = Dataset::load(&path).unwrap();
        assert_eq!(dataset.name(), "SHARADAR");
        let names: Vec<&str> = dataset.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["SEP", "TICKERS"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dataset::load(Path::new("/nonexistent/ds.yaml")).unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(_)));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "- just\n- a list\n").unwrap();

        let err = Dataset::load(&path).unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(msg) if msg.contains("bad.yaml")));
    }

    #[test]
    fn test_discover_spec_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["zacks.yaml", "notes.txt", "sharadar.yml", "alpha.yaml"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let files = discover_spec_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.yaml", "sharadar.yml", "zacks.yaml"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let err = discover_spec_files(Path::new("/nonexistent/schemas")).unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(_)));
    }
}

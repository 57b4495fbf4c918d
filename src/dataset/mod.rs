mod loader;
mod report;

pub use loader::{Dataset, dataset_name, discover_spec_files, run_datasets};
pub use report::{DatasetReport, RunReport, TableOutcome};

mod context;
mod mode;
mod refresher;
mod transform;

pub use context::SyncContext;
pub use mode::{RefreshMode, destination_for, resolve_mode};
pub use refresher::{RefreshSummary, TableRefresher, TableState};
pub use transform::{DATE_PARTITION_COLS, Transformed, transform};

mod args;
mod error;
mod logger;

pub use args::{CliArgs, DATE_FORMAT, yesterday};
pub use error::SyncError;
pub use logger::setup_logging;

pub mod conf;
pub mod core;
pub mod dataset;
pub mod fetch;
pub mod refresh;
pub mod store;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

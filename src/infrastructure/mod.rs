// On-disk backtest cache and CSV lab reports
pub mod cache;

// In-memory data source for tests
pub mod mock;

pub mod offline;

pub use cache::{BacktestCache, ReportStore};
pub use mock::InMemoryLabDataSource;
pub use offline::OfflineLabDataSource;

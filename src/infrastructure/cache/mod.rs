pub mod backtest_cache;
pub mod report_store;

pub use backtest_cache::{BacktestCache, CachedBacktest};
pub use report_store::{GenerationIndex, ReportStore};

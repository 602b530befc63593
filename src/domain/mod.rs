// Backtest records and derived analyses
pub mod backtest;

// Parameter typing and range planning
pub mod optimization;

// Drawdown, ROI and robustness math
pub mod performance;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;

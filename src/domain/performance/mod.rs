// Performance analytics over backtest results
pub mod drawdown;
pub mod robustness;
pub mod roi;

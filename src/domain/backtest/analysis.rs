use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One sample of the realized-profit history that sits below the zero baseline.
///
/// `timestamp` is synthesized (evenly spaced backward from an anchor); the
/// source carries no per-sample time, so treat it as an ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEvent {
    pub timestamp: DateTime<Utc>,
    pub sample_index: usize,
    pub balance: f64,
    pub drawdown_amount: f64,
    pub drawdown_percentage: f64,
}

/// Drawdown summary over a realized-profit history.
///
/// Invariants: `drawdown_count == events.len()`, `drawdown_count` equals the
/// number of negative samples and `lowest_balance` is the history minimum
/// (0.0 for an empty history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown_percentage: f64,
    pub lowest_balance: f64,
    pub drawdown_count: usize,
    pub events: Vec<DrawdownEvent>,
    pub balance_history: Vec<f64>,
}

impl DrawdownAnalysis {
    pub fn empty() -> Self {
        Self {
            max_drawdown_percentage: 0.0,
            lowest_balance: 0.0,
            drawdown_count: 0,
            events: Vec::new(),
            balance_history: Vec::new(),
        }
    }
}

/// Normalized metrics for one backtest of a lab.
///
/// Built once by the metric extractor and never mutated; a refresh replaces
/// the whole value. `calculated_roi_percentage` always comes from the closed
/// position ledger, never from the platform-reported ROI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestAnalysis {
    pub lab_id: String,
    pub backtest_id: String,
    pub generation_idx: Option<u32>,
    pub population_idx: Option<u32>,
    pub market_tag: String,
    pub script_id: String,
    pub script_name: String,

    // ROI
    pub roi_percentage: f64,
    pub calculated_roi_percentage: f64,
    pub roi_difference: f64,

    // Trade statistics
    pub win_rate: f64,
    pub total_trades: usize,
    pub max_drawdown: f64,

    // Balances
    pub realized_profits: f64,
    pub starting_balance: f64,
    pub final_balance: f64,
    pub peak_balance: f64,

    pub parameter_values: BTreeMap<String, Value>,
    pub drawdown_analysis: DrawdownAnalysis,
    pub analysis_timestamp: DateTime<Utc>,
}

impl BacktestAnalysis {
    /// True when the re-derived ROI is further than `threshold_pct` points from
    /// the platform figure.
    pub fn has_roi_divergence(&self, threshold_pct: f64) -> bool {
        self.roi_difference > threshold_pct
    }

    /// Returns a copy carrying generation/population indices from another
    /// source (listing or report index) when the record itself had none.
    pub fn with_generation_fallback(
        mut self,
        generation_idx: Option<u32>,
        population_idx: Option<u32>,
    ) -> Self {
        self.generation_idx = self.generation_idx.or(generation_idx);
        self.population_idx = self.population_idx.or(population_idx);
        self
    }
}

/// A backtest the lab pass had to skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestFailure {
    pub backtest_id: String,
    pub reason: String,
    pub retryable: bool,
}

/// Outcome of one lab pass. Owned by the caller; never persisted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabAnalysisResult {
    pub lab_id: String,
    pub lab_name: String,
    pub total_backtests: usize,
    pub analyzed_backtests: usize,
    pub cache_hits: usize,
    pub top_backtests: Vec<BacktestAnalysis>,
    pub failures: Vec<BacktestFailure>,
    /// Analyzed backtests whose ROI cross-check diverged beyond the threshold.
    pub roi_divergent: Vec<String>,
    pub processing_time: Duration,
}

impl LabAnalysisResult {
    /// The lab listed no backtests at all.
    pub fn is_empty_lab(&self) -> bool {
        self.total_backtests == 0
    }

    /// Backtests were listed but none could be analyzed.
    pub fn all_failed(&self) -> bool {
        self.total_backtests > 0 && self.analyzed_backtests == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total: usize, analyzed: usize) -> LabAnalysisResult {
        LabAnalysisResult {
            lab_id: "lab".to_string(),
            lab_name: "Lab".to_string(),
            total_backtests: total,
            analyzed_backtests: analyzed,
            cache_hits: 0,
            top_backtests: vec![],
            failures: vec![],
            roi_divergent: vec![],
            processing_time: Duration::ZERO,
        }
    }

    #[test]
    fn test_empty_lab_vs_all_failed() {
        let empty = result(0, 0);
        assert!(empty.is_empty_lab());
        assert!(!empty.all_failed());

        let failed = result(4, 0);
        assert!(!failed.is_empty_lab());
        assert!(failed.all_failed());

        let partial = result(4, 3);
        assert!(!partial.all_failed());
    }
}

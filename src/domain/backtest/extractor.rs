//! Metric extraction from raw runtime records.
//!
//! Extraction is total over parseable records: a missing sub-section falls
//! back to a documented default and is reported as an
//! [`ExtractionAmbiguity`]. Only a payload that is not a JSON object fails,
//! with [`AnalysisError::Structural`].
//!
//! Defaults:
//! - starting balance: the configured default (10000 unless overridden)
//! - profit history: empty, so final and peak balance fall back to
//!   `start + realized_profits`
//! - reported ROI: 0.0
//! - reported max drawdown: the drawdown analyzer's value
//! - closed positions: none (0 trades, 0% win rate, 0% calculated ROI)

use crate::domain::backtest::analysis::BacktestAnalysis;
use crate::domain::backtest::raw_record::RawRecord;
use crate::domain::errors::{AnalysisError, ExtractionAmbiguity};
use crate::domain::performance::drawdown::DrawdownAnalyzer;
use crate::domain::performance::roi::RoiCrossChecker;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Parameter names (lowercased substrings) that never count as optimizable.
const EXCLUDED_PARAMETERS: &[&str] = &[
    "trade amount",
    "order size",
    "entry order type",
    "cooldown",
    "reset",
];

/// Cosmetic renames applied to copied parameter names, in order.
const PARAMETER_RENAMES: &[(&str, &str)] = &[
    ("TP ", "Take Profit "),
    ("SL ", "Stop Loss "),
    ("pct", "%"),
];

pub const DEFAULT_STARTING_BALANCE: f64 = 10_000.0;

/// An analysis plus the gaps that were papered over while building it.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub analysis: BacktestAnalysis,
    pub ambiguities: Vec<ExtractionAmbiguity>,
}

/// Builds [`BacktestAnalysis`] values from raw runtime records.
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    default_starting_balance: f64,
    roi_divergence_threshold: f64,
    drawdown: DrawdownAnalyzer,
}

impl MetricExtractor {
    pub fn new(
        default_starting_balance: f64,
        roi_divergence_threshold: f64,
        drawdown: DrawdownAnalyzer,
    ) -> Self {
        Self {
            default_starting_balance,
            roi_divergence_threshold,
            drawdown,
        }
    }

    pub fn roi_divergence_threshold(&self) -> f64 {
        self.roi_divergence_threshold
    }

    pub fn extract(
        &self,
        lab_id: &str,
        backtest_id: &str,
        raw: &Value,
    ) -> Result<BacktestAnalysis, AnalysisError> {
        let report = self.extract_with_report(lab_id, backtest_id, raw, Utc::now())?;
        if !report.ambiguities.is_empty() {
            debug!(
                "Backtest {} extracted with defaults: {:?}",
                backtest_id, report.ambiguities
            );
        }
        Ok(report.analysis)
    }

    pub fn extract_with_report(
        &self,
        lab_id: &str,
        backtest_id: &str,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<ExtractionReport, AnalysisError> {
        let record = RawRecord::new(raw.clone()).map_err(|e| AnalysisError::Structural {
            backtest_id: backtest_id.to_string(),
            reason: e.to_string(),
        })?;
        let mut ambiguities = Vec::new();

        // 1. Performance report
        let performance = record.performance_report();
        if performance.is_none() {
            ambiguities.push(ExtractionAmbiguity::MissingPerformanceReport);
        }

        let starting_balance = match performance.and_then(|p| p.starting_balance()) {
            Some(sb) => sb,
            None => {
                ambiguities.push(ExtractionAmbiguity::MissingStartingBalance);
                self.default_starting_balance
            }
        };

        let history = match performance.and_then(|p| p.profit_history()) {
            Some(h) => h,
            None => {
                ambiguities.push(ExtractionAmbiguity::MissingProfitHistory);
                Vec::new()
            }
        };

        let roi_percentage = match performance.and_then(|p| p.reported_roi()) {
            Some(roi) => roi,
            None => {
                ambiguities.push(ExtractionAmbiguity::MissingReportedRoi);
                0.0
            }
        };

        let reported_drawdown = performance.and_then(|p| p.reported_max_drawdown());
        if reported_drawdown.is_none() {
            ambiguities.push(ExtractionAmbiguity::MissingReportedDrawdown);
        }

        // 2. Closed positions and 3. ROI cross-check
        let positions = match record.closed_positions() {
            Some(p) => p,
            None => {
                ambiguities.push(ExtractionAmbiguity::MissingPositionLedger);
                Vec::new()
            }
        };
        let roi_check = RoiCrossChecker::check_positions(&positions);
        if !roi_check.exact_arithmetic {
            ambiguities.push(ExtractionAmbiguity::InexactRoiArithmetic);
        }
        ambiguities.extend(
            roi_check
                .positions_without_entries
                .iter()
                .map(|id| ExtractionAmbiguity::MissingEntryOrders {
                    position_id: id.clone(),
                }),
        );

        let total_trades = roi_check.positions;
        let win_rate = if total_trades > 0 {
            roi_check.winning_positions as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let roi_difference = roi_check.difference_from(roi_percentage);
        if roi_difference > self.roi_divergence_threshold {
            warn!(
                "Backtest {} ROI divergence: reported {:.2}% vs calculated {:.2}% (diff {:.2})",
                backtest_id, roi_percentage, roi_check.calculated_roi_percentage, roi_difference
            );
        }

        let realized_profits = performance
            .and_then(|p| p.realized_profits())
            .or_else(|| history.last().copied())
            .unwrap_or(roi_check.total_net_profit);

        let (final_balance, peak_balance) = match (history.last(), max_of(&history)) {
            (Some(last), Some(max)) => (starting_balance + last, starting_balance + max),
            _ => {
                let end = starting_balance + realized_profits;
                (end, end.max(starting_balance))
            }
        };

        // 4. Drawdowns
        let anchor = record
            .end_time()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or(now);
        let drawdown_analysis = self.drawdown.analyze_anchored(&history, anchor);
        let max_drawdown = reported_drawdown
            .map(f64::abs)
            .unwrap_or(drawdown_analysis.max_drawdown_percentage);

        // 5. Parameters
        let parameter_values = match record.parameter_inputs() {
            Some(inputs) => optimizable_parameters(inputs),
            None => {
                ambiguities.push(ExtractionAmbiguity::MissingParameters);
                BTreeMap::new()
            }
        };

        let analysis = BacktestAnalysis {
            lab_id: lab_id.to_string(),
            backtest_id: backtest_id.to_string(),
            generation_idx: record.generation_idx(),
            population_idx: record.population_idx(),
            market_tag: record.market_tag().unwrap_or_default(),
            script_id: record.script_id().unwrap_or_default(),
            script_name: record.script_name().unwrap_or_default(),
            roi_percentage,
            calculated_roi_percentage: roi_check.calculated_roi_percentage,
            roi_difference,
            win_rate,
            total_trades,
            max_drawdown,
            realized_profits,
            starting_balance,
            final_balance,
            peak_balance,
            parameter_values,
            drawdown_analysis,
            analysis_timestamp: now,
        };

        Ok(ExtractionReport {
            analysis,
            ambiguities,
        })
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_STARTING_BALANCE, 5.0, DrawdownAnalyzer::default())
    }
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn optimizable_parameters(inputs: Vec<(String, Value)>) -> BTreeMap<String, Value> {
    inputs
        .into_iter()
        .filter(|(name, _)| {
            let lowered = name.to_lowercase();
            !EXCLUDED_PARAMETERS.iter().any(|ex| lowered.contains(ex))
        })
        .map(|(name, value)| (display_name(&name), value))
        .collect()
}

fn display_name(name: &str) -> String {
    PARAMETER_RENAMES
        .iter()
        .fold(name.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn full_record() -> Value {
        json!({
            "ScriptId": "script-9",
            "ScriptName": "RSI Scalper",
            "Market": "BINANCE_BTC_USDT_",
            "Reports": {
                "BINANCE_BTC_USDT_": {
                    "PR": {
                        "SB": 10000,
                        "RPH": [100, -50, 300, -20, 500],
                        "ROI": 5.0,
                        "MDD": 0.5,
                        "RP": 500
                    }
                }
            },
            "FinishedPositions": [
                { "g": "a", "rp": 130.0, "fe": 10.0, "eno": [{ "m": 1000.0 }] },
                { "g": "b", "rp": -35.0, "fe": 5.0, "eno": [{ "m": 500.0 }] }
            ],
            "InputFields": {
                "RSI Length": 14,
                "TP pct": 1.5,
                "SL pct": 0.8,
                "Trade Amount": 100,
                "Cooldown": 5,
                "Reset Bot": false
            }
        })
    }

    #[test]
    fn test_balance_scenario() {
        let extractor = MetricExtractor::default();
        let report = extractor
            .extract_with_report("lab", "bt", &full_record(), fixed_now())
            .unwrap();
        let a = report.analysis;

        assert_eq!(a.starting_balance, 10000.0);
        assert_eq!(a.final_balance, 10500.0);
        assert_eq!(a.peak_balance, 10500.0);
        assert_eq!(a.drawdown_analysis.lowest_balance, -50.0);
        assert_eq!(a.drawdown_analysis.drawdown_count, 2);
        assert_eq!(a.realized_profits, 500.0);
        assert!(report.ambiguities.is_empty());
    }

    #[test]
    fn test_trades_win_rate_and_roi() {
        let a = MetricExtractor::default()
            .extract_with_report("lab", "bt", &full_record(), fixed_now())
            .unwrap()
            .analysis;

        assert_eq!(a.total_trades, 2);
        assert_eq!(a.win_rate, 50.0);
        assert!((a.calculated_roi_percentage - 5.333_333_333_333).abs() < 1e-9);
        assert!((a.roi_difference - (a.calculated_roi_percentage - 5.0).abs()).abs() < 1e-12);
        assert!(a.roi_difference >= 0.0);
        assert_eq!(a.max_drawdown, 0.5);
    }

    #[test]
    fn test_calculated_roi_not_copied_from_platform() {
        let mut record = full_record();
        record["Reports"]["BINANCE_BTC_USDT_"]["PR"]["ROI"] = json!(42.0);
        let a = MetricExtractor::default()
            .extract_with_report("lab", "bt", &record, fixed_now())
            .unwrap()
            .analysis;

        assert_eq!(a.roi_percentage, 42.0);
        assert!((a.calculated_roi_percentage - 5.333_333_333_333).abs() < 1e-9);
    }

    #[test]
    fn test_parameter_filter_and_renames() {
        let a = MetricExtractor::default()
            .extract_with_report("lab", "bt", &full_record(), fixed_now())
            .unwrap()
            .analysis;

        let names: Vec<&str> = a.parameter_values.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["RSI Length", "Stop Loss %", "Take Profit %"]);
        assert_eq!(a.parameter_values["RSI Length"], json!(14));
    }

    #[test]
    fn test_identity_fields() {
        let a = MetricExtractor::default()
            .extract_with_report("lab-1", "bt-2", &full_record(), fixed_now())
            .unwrap()
            .analysis;

        assert_eq!(a.lab_id, "lab-1");
        assert_eq!(a.backtest_id, "bt-2");
        assert_eq!(a.script_id, "script-9");
        assert_eq!(a.script_name, "RSI Scalper");
        assert_eq!(a.market_tag, "BINANCE_BTC_USDT_");
        assert_eq!(a.analysis_timestamp, fixed_now());
    }

    #[test]
    fn test_empty_object_degrades_to_defaults() {
        let report = MetricExtractor::new(2500.0, 5.0, DrawdownAnalyzer::default())
            .extract_with_report("lab", "bt", &json!({}), fixed_now())
            .unwrap();
        let a = report.analysis;

        assert_eq!(a.starting_balance, 2500.0);
        assert_eq!(a.final_balance, 2500.0);
        assert_eq!(a.total_trades, 0);
        assert_eq!(a.win_rate, 0.0);
        assert_eq!(a.calculated_roi_percentage, 0.0);
        assert_eq!(a.roi_percentage, 0.0);
        assert!(report
            .ambiguities
            .contains(&ExtractionAmbiguity::MissingPerformanceReport));
        assert!(report
            .ambiguities
            .contains(&ExtractionAmbiguity::MissingPositionLedger));
    }

    #[test]
    fn test_missing_history_uses_realized_profits() {
        let record = json!({
            "Reports": { "k": { "PR": { "SB": 1000, "RP": 250, "ROI": 25 } } },
            "FinishedPositions": []
        });
        let report = MetricExtractor::default()
            .extract_with_report("lab", "bt", &record, fixed_now())
            .unwrap();

        assert_eq!(report.analysis.final_balance, 1250.0);
        assert_eq!(report.analysis.peak_balance, 1250.0);
        assert!(report
            .ambiguities
            .contains(&ExtractionAmbiguity::MissingProfitHistory));
    }

    #[test]
    fn test_unparseable_record_is_structural_error() {
        let err = MetricExtractor::default()
            .extract("lab", "bt-x", &json!("garbage"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Structural { ref backtest_id, .. } if backtest_id == "bt-x"));
    }

    #[test]
    fn test_drawdown_anchored_at_end_time() {
        let mut record = full_record();
        record["EndTime"] = json!(1_600_000_000);
        let a = MetricExtractor::default()
            .extract_with_report("lab", "bt", &record, fixed_now())
            .unwrap()
            .analysis;

        let last_event = a.drawdown_analysis.events.last().unwrap();
        let end = DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap();
        // Sample 3 of 5: one interval before the anchor
        assert_eq!(last_event.timestamp, end - chrono::Duration::hours(1));
    }

    #[test]
    fn test_oversized_position_is_ambiguity_not_failure() {
        let record = json!({
            "FinishedPositions": [{ "rp": 1e27, "fe": 0, "eno": [{ "m": 0.001 }] }]
        });
        let report = MetricExtractor::default()
            .extract_with_report("lab", "bt", &record, fixed_now())
            .unwrap();

        assert_eq!(report.analysis.total_trades, 1);
        assert_eq!(report.analysis.win_rate, 100.0);
        assert!(report.analysis.calculated_roi_percentage.is_finite());
        assert!(report
            .ambiguities
            .contains(&ExtractionAmbiguity::InexactRoiArithmetic));
    }
}

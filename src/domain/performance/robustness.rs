use crate::domain::backtest::analysis::BacktestAnalysis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.pad(label)
    }
}

/// Robustness of one backtest relative to its lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessMetrics {
    pub lab_id: String,
    pub backtest_id: String,
    pub robustness_score: f64,
    pub roi_consistency_score: f64,
    pub drawdown_score: f64,
    pub win_rate_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

/// Weights and thresholds for the composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustnessConfig {
    pub roi_weight: f64,
    pub drawdown_weight: f64,
    pub win_rate_weight: f64,
    /// Points deducted from ROI consistency per point of ROI difference
    pub roi_penalty_per_point: f64,
    /// Points deducted from drawdown severity per percent of max drawdown
    pub drawdown_penalty_per_pct: f64,
    /// Below this many trades the win-rate score is scaled down linearly
    pub min_trades: usize,
    pub low_risk_threshold: f64,
    pub medium_risk_threshold: f64,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            roi_weight: 0.35,
            drawdown_weight: 0.35,
            win_rate_weight: 0.30,
            roi_penalty_per_point: 5.0,
            drawdown_penalty_per_pct: 2.0,
            min_trades: 10,
            low_risk_threshold: 70.0,
            medium_risk_threshold: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Weakness {
    RoiConsistency,
    Drawdown,
    WinRate,
}

/// Lab-wide win-rate distribution, used for the stability component.
#[derive(Debug, Clone, Copy)]
struct WinRateDistribution {
    mean: f64,
    std_dev: f64,
}

impl WinRateDistribution {
    fn from_analyses(analyses: &[BacktestAnalysis]) -> Self {
        let rates: Vec<f64> = analyses.iter().map(|a| a.win_rate).collect();
        if rates.len() < 2 {
            return Self {
                mean: rates.first().copied().unwrap_or(0.0),
                std_dev: 0.0,
            };
        }
        Self {
            mean: rates.iter().mean(),
            std_dev: rates.iter().std_dev(),
        }
    }

    /// 100 at the lab mean, falling 25 points per standard deviation away.
    fn consistency(&self, win_rate: f64) -> f64 {
        if !self.std_dev.is_finite() || self.std_dev <= f64::EPSILON {
            return 100.0;
        }
        let z = (win_rate - self.mean) / self.std_dev;
        100.0 - (z.abs() * 25.0).min(100.0)
    }
}

/// Scores a lab's analyses. Read-only: works from cached entities and never
/// fetches anything.
#[derive(Debug, Clone, Default)]
pub struct RobustnessScorer {
    config: RobustnessConfig,
}

impl RobustnessScorer {
    pub fn new(config: RobustnessConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, analyses: &[BacktestAnalysis]) -> BTreeMap<String, RobustnessMetrics> {
        let distribution = WinRateDistribution::from_analyses(analyses);

        analyses
            .par_iter()
            .map(|analysis| {
                (
                    analysis.backtest_id.clone(),
                    self.score_one(analysis, distribution),
                )
            })
            .collect()
    }

    fn score_one(
        &self,
        analysis: &BacktestAnalysis,
        distribution: WinRateDistribution,
    ) -> RobustnessMetrics {
        let cfg = &self.config;

        let roi_consistency_score =
            clamp_score(100.0 - analysis.roi_difference * cfg.roi_penalty_per_point);

        let severity = clamp_score(100.0 - analysis.max_drawdown.abs() * cfg.drawdown_penalty_per_pct);
        let frequency_ratio = analysis.drawdown_analysis.drawdown_count as f64
            / analysis.total_trades.max(1) as f64;
        let frequency = 100.0 * (1.0 - frequency_ratio.min(1.0));
        let drawdown_score = clamp_score(0.6 * severity + 0.4 * frequency);

        let sample_factor = if cfg.min_trades == 0 {
            1.0
        } else {
            (analysis.total_trades as f64 / cfg.min_trades as f64).min(1.0)
        };
        let win_rate_score = clamp_score(
            (0.7 * clamp_score(analysis.win_rate)
                + 0.3 * distribution.consistency(analysis.win_rate))
                * sample_factor,
        );

        let weight_sum = cfg.roi_weight + cfg.drawdown_weight + cfg.win_rate_weight;
        let composite = if weight_sum > 0.0 {
            (cfg.roi_weight * roi_consistency_score
                + cfg.drawdown_weight * drawdown_score
                + cfg.win_rate_weight * win_rate_score)
                / weight_sum
        } else {
            0.0
        };
        let robustness_score = clamp_score(composite);

        let risk_level = if robustness_score >= cfg.low_risk_threshold {
            RiskLevel::Low
        } else if robustness_score >= cfg.medium_risk_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let weakest = weakest_area(roi_consistency_score, drawdown_score, win_rate_score);

        RobustnessMetrics {
            lab_id: analysis.lab_id.clone(),
            backtest_id: analysis.backtest_id.clone(),
            robustness_score,
            roi_consistency_score,
            drawdown_score,
            win_rate_score,
            risk_level,
            recommendation: recommendation(analysis, risk_level, weakest),
        }
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

// Ties resolve in declaration order: ROI, then drawdown, then win rate.
fn weakest_area(roi: f64, drawdown: f64, win_rate: f64) -> Weakness {
    let mut weakest = (Weakness::RoiConsistency, roi);
    for candidate in [(Weakness::Drawdown, drawdown), (Weakness::WinRate, win_rate)] {
        if candidate.1 < weakest.1 {
            weakest = candidate;
        }
    }
    weakest.0
}

fn recommendation(analysis: &BacktestAnalysis, risk: RiskLevel, weakest: Weakness) -> String {
    let prefix = match risk {
        RiskLevel::Low => "Robust candidate",
        RiskLevel::Medium => "Usable with caution",
        RiskLevel::High => "Not recommended",
    };

    let detail = match weakest {
        Weakness::RoiConsistency => format!(
            "reported ROI differs from ledger ROI by {:.2} points; verify fees and position accounting",
            analysis.roi_difference
        ),
        Weakness::Drawdown => format!(
            "max drawdown {:.2}% over {} drawdown samples; tighten stops or reduce position size",
            analysis.max_drawdown, analysis.drawdown_analysis.drawdown_count
        ),
        Weakness::WinRate => format!(
            "win rate {:.1}% over {} trades is weak or unstable against the lab; gather more trades before deploying",
            analysis.win_rate, analysis.total_trades
        ),
    };

    format!("{}: {}", prefix, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::analysis::DrawdownAnalysis;
    use chrono::Utc;

    fn analysis(id: &str, roi_diff: f64, max_dd: f64, dd_count: usize, win_rate: f64, trades: usize) -> BacktestAnalysis {
        let mut drawdown = DrawdownAnalysis::empty();
        drawdown.drawdown_count = dd_count;
        BacktestAnalysis {
            lab_id: "lab".to_string(),
            backtest_id: id.to_string(),
            generation_idx: None,
            population_idx: None,
            market_tag: String::new(),
            script_id: String::new(),
            script_name: String::new(),
            roi_percentage: 10.0,
            calculated_roi_percentage: 10.0 - roi_diff,
            roi_difference: roi_diff,
            win_rate,
            total_trades: trades,
            max_drawdown: max_dd,
            realized_profits: 0.0,
            starting_balance: 10_000.0,
            final_balance: 10_000.0,
            peak_balance: 10_000.0,
            parameter_values: BTreeMap::new(),
            drawdown_analysis: drawdown,
            analysis_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_clean_backtest_is_low_risk() {
        let scorer = RobustnessScorer::default();
        let scores = scorer.score(&[analysis("a", 0.0, 2.0, 1, 70.0, 50)]);
        let m = &scores["a"];

        assert!(m.robustness_score >= 70.0, "score {}", m.robustness_score);
        assert_eq!(m.risk_level, RiskLevel::Low);
        assert!(m.recommendation.starts_with("Robust candidate"));
    }

    #[test]
    fn test_bad_backtest_is_high_risk() {
        let scorer = RobustnessScorer::default();
        let scores = scorer.score(&[analysis("b", 30.0, 60.0, 40, 10.0, 40)]);
        let m = &scores["b"];

        assert_eq!(m.roi_consistency_score, 0.0);
        assert_eq!(m.risk_level, RiskLevel::High);
        assert!(m.robustness_score < 40.0);
    }

    #[test]
    fn test_scores_bounded_and_keyed_by_backtest() {
        let analyses = vec![
            analysis("x", 0.0, 0.0, 0, 100.0, 100),
            analysis("y", 500.0, 900.0, 10, 0.0, 0),
            analysis("z", 2.0, 10.0, 3, 55.0, 12),
        ];
        let scores = RobustnessScorer::default().score(&analyses);

        assert_eq!(scores.keys().cloned().collect::<Vec<_>>(), vec!["x", "y", "z"]);
        for m in scores.values() {
            for s in [m.robustness_score, m.roi_consistency_score, m.drawdown_score, m.win_rate_score] {
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }

    #[test]
    fn test_recommendation_targets_weakest_area() {
        let scores = RobustnessScorer::default().score(&[analysis("r", 15.0, 1.0, 0, 60.0, 30)]);
        assert!(scores["r"].recommendation.contains("ledger ROI"));

        let scores = RobustnessScorer::default().score(&[analysis("d", 0.0, 45.0, 20, 60.0, 30)]);
        assert!(scores["d"].recommendation.contains("max drawdown"));
    }

    #[test]
    fn test_few_trades_penalize_win_rate_score() {
        let scorer = RobustnessScorer::default();
        let few = scorer.score(&[analysis("f", 0.0, 0.0, 0, 80.0, 2)]);
        let many = scorer.score(&[analysis("m", 0.0, 0.0, 0, 80.0, 20)]);
        assert!(few["f"].win_rate_score < many["m"].win_rate_score);
    }

    #[test]
    fn test_risk_level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(RiskLevel::High.to_string(), "HIGH");
    }

    fn roi_only_scorer() -> RobustnessScorer {
        RobustnessScorer::new(RobustnessConfig {
            roi_weight: 1.0,
            drawdown_weight: 0.0,
            win_rate_weight: 0.0,
            roi_penalty_per_point: 1.0,
            ..RobustnessConfig::default()
        })
    }

    #[test]
    fn test_risk_threshold_boundaries() {
        let scorer = roi_only_scorer();
        let cases = [
            ("at-low", 30.0, 70.0, RiskLevel::Low),
            ("below-low", 30.01, 69.99, RiskLevel::Medium),
            ("at-medium", 60.0, 40.0, RiskLevel::Medium),
            ("below-medium", 60.01, 39.99, RiskLevel::High),
        ];

        for (id, roi_diff, expected_score, expected_level) in cases {
            let scores = scorer.score(&[analysis(id, roi_diff, 0.0, 0, 50.0, 50)]);
            let m = &scores[id];
            assert!((m.robustness_score - expected_score).abs() < 1e-9, "{}: {}", id, m.robustness_score);
            assert_eq!(m.risk_level, expected_level, "{}", id);
        }
    }

    #[test]
    fn test_custom_thresholds_move_the_boundaries() {
        let scorer = RobustnessScorer::new(RobustnessConfig {
            low_risk_threshold: 90.0,
            medium_risk_threshold: 80.0,
            ..roi_only_scorer().config
        });
        let scores = scorer.score(&[analysis("s", 15.0, 0.0, 0, 50.0, 50)]);
        assert_eq!(scores["s"].robustness_score, 85.0);
        assert_eq!(scores["s"].risk_level, RiskLevel::Medium);
    }
}

//! Console tables and JSON export for lab results.

use crate::domain::backtest::analysis::{BacktestAnalysis, LabAnalysisResult};
use crate::domain::optimization::range_generator::{ParameterOptimizationPlan, PlanAction};
use crate::domain::performance::robustness::RobustnessMetrics;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 96;

pub struct LabReporter {
    output_dir: PathBuf,
}

impl LabReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn print_lab_summary(&self, result: &LabAnalysisResult) {
        print!("{}", render_lab_summary(result));
    }

    pub fn print_robustness_table(&self, metrics: &BTreeMap<String, RobustnessMetrics>) {
        print!("{}", render_robustness_table(metrics));
    }

    pub fn print_plans(&self, plans: &[ParameterOptimizationPlan]) {
        print!("{}", render_plans(plans));
    }

    /// Writes `value` as pretty JSON. Bare file names land in the output directory.
    pub fn export_json<T: Serialize + ?Sized>(&self, value: &T, filename: &str) -> Result<PathBuf> {
        let candidate = Path::new(filename);
        let output_path = if candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            self.output_dir.join(candidate)
        };

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {:?}", parent))?;
        }

        let json_output =
            serde_json::to_string_pretty(value).context("Failed to serialize results to JSON")?;
        std::fs::write(&output_path, json_output)
            .context(format!("Failed to write results to {:?}", output_path))?;

        println!("Results saved to: {}", output_path.display());
        Ok(output_path)
    }
}

impl Default for LabReporter {
    fn default() -> Self {
        Self::new(".")
    }
}

pub fn render_lab_summary(result: &LabAnalysisResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "LAB {} ({})", result.lab_name, result.lab_id);
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));

    if result.is_empty_lab() {
        let _ = writeln!(out, "No backtests listed for this lab.");
        return out;
    }
    if result.all_failed() {
        let _ = writeln!(
            out,
            "All {} backtests failed to analyze.",
            result.total_backtests
        );
    }

    let _ = writeln!(
        out,
        "Analyzed {}/{} backtests ({} from cache, {} failed)",
        result.analyzed_backtests,
        result.total_backtests,
        result.cache_hits,
        result.failures.len()
    );
    out.push_str(&render_backtest_table(&result.top_backtests));

    if !result.roi_divergent.is_empty() {
        let _ = writeln!(
            out,
            "ROI cross-check diverged for: {}",
            result.roi_divergent.join(", ")
        );
    }
    for failure in &result.failures {
        let _ = writeln!(
            out,
            "  failed {}: {}{}",
            failure.backtest_id,
            failure.reason,
            if failure.retryable { " (retryable)" } else { "" }
        );
    }
    out
}

pub fn render_backtest_table(analyses: &[BacktestAnalysis]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4} | {:<24} | {:>5} | {:>5} | {:>9} | {:>9} | {:>8} | {:>7} | {:>8}",
        "#", "Backtest", "Gen", "Pop", "ROI%", "CalcROI%", "WinRate", "Trades", "MaxDD%"
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    for (i, a) in analyses.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} | {:<24} | {:>5} | {:>5} | {:>9.2} | {:>9.2} | {:>7.1}% | {:>7} | {:>8.2}",
            i + 1,
            truncate(&a.backtest_id, 24),
            index_text(a.generation_idx),
            index_text(a.population_idx),
            a.roi_percentage,
            a.calculated_roi_percentage,
            a.win_rate,
            a.total_trades,
            a.max_drawdown
        );
    }
    out
}

pub fn render_robustness_table(metrics: &BTreeMap<String, RobustnessMetrics>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} | {:>6} | {:>6} | {:>6} | {:>6} | {:<6} | Recommendation",
        "Backtest", "Score", "ROI", "DD", "Win", "Risk"
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    for (backtest_id, m) in metrics {
        let _ = writeln!(
            out,
            "{:<24} | {:>6.1} | {:>6.1} | {:>6.1} | {:>6.1} | {:<6} | {}",
            truncate(backtest_id, 24),
            m.robustness_score,
            m.roi_consistency_score,
            m.drawdown_score,
            m.win_rate_score,
            m.risk_level,
            m.recommendation
        );
    }
    out
}

pub fn render_plans(plans: &[ParameterOptimizationPlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let action = match plan.action {
            PlanAction::Disable => "DISABLE",
            PlanAction::Optimize => "OPTIMIZE",
            PlanAction::KeepDefault => "KEEP_DEFAULT",
        };
        let _ = writeln!(
            out,
            "{:<32} {:<12} current={}",
            truncate(&plan.key, 32),
            action,
            plan.current_value
        );
        if !plan.candidates().is_empty() {
            let values: Vec<String> = plan.candidates().iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "    range: [{}]", values.join(", "));
        }
        let _ = writeln!(out, "    {}", plan.reason);
    }
    out
}

fn index_text(idx: Option<u32>) -> String {
    idx.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}~", kept)
    }
}

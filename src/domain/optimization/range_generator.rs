//! Search-range planning for lab parameters.
//!
//! Each parameter gets exactly one action:
//! 1. DISABLE when its name hits the disabled name/keyword set
//! 2. OPTIMIZE when it is numeric with a parseable current value; the window
//!    comes from a name-based category and the step from its precision
//! 3. KEEP_DEFAULT otherwise

use crate::domain::optimization::parameter::{LabParameter, ParameterValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    Disable,
    Optimize,
    KeepDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOptimizationPlan {
    pub key: String,
    pub action: PlanAction,
    pub current_value: ParameterValue,
    /// Present only for `PlanAction::Optimize`.
    pub candidate_range: Option<Vec<ParameterValue>>,
    pub reason: String,
}

impl ParameterOptimizationPlan {
    pub fn candidates(&self) -> &[ParameterValue] {
        self.candidate_range.as_deref().unwrap_or(&[])
    }
}

/// Range generation settings. Loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Upper bound on candidates per parameter (at least 2).
    pub max_values: usize,
    /// Lowercased substrings that disable a parameter.
    pub disabled_keywords: Vec<String>,
    /// Exact parameter names (case-insensitive) that are always disabled.
    pub disabled_names: Vec<String>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            max_values: 10,
            disabled_keywords: ["stop", "gain", "profit", "deviation", "consensus"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            disabled_names: Vec::new(),
        }
    }
}

/// Name-based category that decides how wide the search window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterCategory {
    Rate,
    Period,
    Threshold,
    Multiplier,
    Generic,
}

impl ParameterCategory {
    pub fn classify(name: &str) -> Self {
        let lowered = name.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

        if has(&["rate", "ratio"]) {
            ParameterCategory::Rate
        } else if has(&["period", "time"]) {
            ParameterCategory::Period
        } else if has(&["threshold", "limit"]) {
            ParameterCategory::Threshold
        } else if has(&["multiplier", "factor"]) {
            ParameterCategory::Multiplier
        } else {
            ParameterCategory::Generic
        }
    }

    /// (low, high) factors applied to the current value.
    fn window(&self) -> (f64, f64) {
        match self {
            ParameterCategory::Rate => (0.5, 1.5),
            ParameterCategory::Period => (0.5, 2.0),
            ParameterCategory::Threshold => (0.8, 1.2),
            ParameterCategory::Multiplier => (0.75, 1.75),
            ParameterCategory::Generic => (0.7, 1.3),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterRangeGenerator {
    config: RangeConfig,
}

impl ParameterRangeGenerator {
    pub fn new(config: RangeConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, parameters: &[LabParameter]) -> Vec<ParameterOptimizationPlan> {
        parameters.iter().map(|p| self.plan_one(p)).collect()
    }

    pub fn plan_one(&self, parameter: &LabParameter) -> ParameterOptimizationPlan {
        let keep = |reason: String| ParameterOptimizationPlan {
            key: parameter.key.clone(),
            action: PlanAction::KeepDefault,
            current_value: parameter.value.clone(),
            candidate_range: None,
            reason,
        };

        if let Some(matched) = self.disabled_match(&parameter.key) {
            return ParameterOptimizationPlan {
                key: parameter.key.clone(),
                action: PlanAction::Disable,
                current_value: parameter.value.clone(),
                candidate_range: None,
                reason: format!("name matches disabled term '{}'", matched),
            };
        }

        let candidates = match &parameter.value {
            ParameterValue::Integer(current) => self.integer_range(&parameter.key, *current),
            ParameterValue::Decimal(current) => {
                self.decimal_range(&parameter.key, *current, parameter.decimals)
            }
            _ => return keep("non-numeric or unparseable value".to_string()),
        };

        if candidates.is_empty() {
            return keep("no candidates inside the search window".to_string());
        }

        let category = ParameterCategory::classify(&parameter.key);
        ParameterOptimizationPlan {
            key: parameter.key.clone(),
            action: PlanAction::Optimize,
            current_value: parameter.value.clone(),
            reason: format!(
                "{:?} window, {} candidates from {} to {}",
                category,
                candidates.len(),
                candidates[0],
                candidates[candidates.len() - 1]
            ),
            candidate_range: Some(candidates),
        }
    }

    fn disabled_match(&self, name: &str) -> Option<String> {
        let lowered = name.to_lowercase();
        if let Some(exact) = self
            .config
            .disabled_names
            .iter()
            .find(|n| n.to_lowercase() == lowered)
        {
            return Some(exact.clone());
        }
        self.config
            .disabled_keywords
            .iter()
            .find(|kw| lowered.contains(&kw.to_lowercase()))
            .cloned()
    }

    fn integer_range(&self, name: &str, current: i64) -> Vec<ParameterValue> {
        let category = ParameterCategory::classify(name);
        let (mut lo, mut hi) = scaled_window(category, current as f64, 1.0, self.max_values());
        lo = lo.floor();
        hi = hi.ceil();
        if category == ParameterCategory::Period {
            lo = lo.max(1.0);
            hi = hi.max(lo);
        }

        enumerate_stepped(lo, hi, 1.0, self.max_values())
            .into_iter()
            .map(|v| ParameterValue::Integer(v.round() as i64))
            .collect()
    }

    fn decimal_range(&self, name: &str, current: f64, decimals: u32) -> Vec<ParameterValue> {
        let precision = if decimals > 0 {
            decimals.min(10)
        } else {
            inferred_decimals(current)
        };
        let step = 10f64.powi(-(precision as i32));
        let category = ParameterCategory::classify(name);
        let (lo, hi) = scaled_window(category, current, step, self.max_values());
        let lo = round_to(lo, precision);
        let hi = round_to(hi, precision);

        let mut values: Vec<f64> = enumerate_stepped(lo, hi, step, self.max_values())
            .into_iter()
            .map(|v| round_to(v, precision))
            .collect();
        values.dedup();
        values.into_iter().map(ParameterValue::Decimal).collect()
    }

    fn max_values(&self) -> usize {
        self.config.max_values.max(2)
    }
}

/// Window scaled from `current`; a zero current value gets `[0, step * (max - 1)]`.
fn scaled_window(category: ParameterCategory, current: f64, step: f64, max_values: usize) -> (f64, f64) {
    if current == 0.0 {
        return (0.0, step * (max_values - 1) as f64);
    }
    let (lo_factor, hi_factor) = category.window();
    let a = current * lo_factor;
    let b = current * hi_factor;
    (a.min(b), a.max(b))
}

/// min, min+step, ... <= max, down-sampled by uniform stride to `max_count`
/// values with both endpoints kept. Values are computed from indices so a
/// huge window never gets materialized.
fn enumerate_stepped(lo: f64, hi: f64, step: f64, max_count: usize) -> Vec<f64> {
    if step <= 0.0 || hi < lo {
        return Vec::new();
    }
    // Index of the last step, kept in f64 so wide windows cannot overflow.
    let last = ((hi - lo) / step + 1e-9).floor();
    if !last.is_finite() {
        return Vec::new();
    }

    if last < max_count as f64 {
        return (0..=last as usize).map(|i| lo + i as f64 * step).collect();
    }

    let mut indices: Vec<f64> = (0..max_count)
        .map(|i| (i as f64 * last / (max_count - 1) as f64).round())
        .collect();
    indices.dedup();
    indices.into_iter().map(|i| lo + i * step).collect()
}

fn inferred_decimals(value: f64) -> u32 {
    let text = format!("{}", value);
    let digits = text
        .split_once('.')
        .map(|(_, frac)| frac.len() as u32)
        .unwrap_or(0);
    digits.clamp(1, 8)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

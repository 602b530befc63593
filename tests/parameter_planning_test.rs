use labscope::application::parameter_planner::ParameterPlanner;
use labscope::domain::optimization::parameter::{ParameterValue, RawLabParameter};
use labscope::domain::optimization::range_generator::{PlanAction, RangeConfig};
use labscope::infrastructure::InMemoryLabDataSource;
use serde_json::json;
use std::sync::Arc;

fn lab_parameters() -> Vec<RawLabParameter> {
    serde_json::from_value(json!([
        { "K": "RSI Length", "T": 0, "O": [14], "D": 0 },
        { "K": "Stop Loss (%)", "T": 1, "O": ["2.5"], "D": 1 },
        { "K": "Take Profit Gain", "T": 1, "O": [4.0], "D": 1 },
        { "K": "ATR Multiplier", "T": 1, "O": [1.5], "D": 2 },
        { "K": "Use EMA", "T": 2, "O": [true] },
        { "K": "Mode", "T": 4, "O": ["fast", "slow"] },
        { "K": "Cooldown Period", "T": 0, "O": [3], "D": 0, "IE": false }
    ]))
    .unwrap()
}

fn planner(config: RangeConfig) -> ParameterPlanner {
    let source = InMemoryLabDataSource::new().with_parameters("lab-1", lab_parameters());
    ParameterPlanner::new(Arc::new(source), config)
}

#[tokio::test]
async fn test_lab_plan_actions() {
    let plans = planner(RangeConfig::default()).plan_for_lab("lab-1").await.unwrap();
    let actions: Vec<(&str, PlanAction)> = plans.iter().map(|p| (p.key.as_str(), p.action)).collect();

    assert_eq!(
        actions,
        vec![
            ("RSI Length", PlanAction::Optimize),
            ("Stop Loss (%)", PlanAction::Disable),
            ("Take Profit Gain", PlanAction::Disable),
            ("ATR Multiplier", PlanAction::Optimize),
            ("Use EMA", PlanAction::KeepDefault),
            ("Mode", PlanAction::KeepDefault),
            ("Cooldown Period", PlanAction::KeepDefault),
        ]
    );
}

#[tokio::test]
async fn test_rsi_length_range_is_integral_and_bounded() {
    let plans = planner(RangeConfig::default()).plan_for_lab("lab-1").await.unwrap();
    let rsi = &plans[0];

    assert_eq!(rsi.current_value, ParameterValue::Integer(14));
    let candidates = rsi.candidates();
    assert!(!candidates.is_empty());
    assert!(candidates.len() <= 10);
    assert!(candidates.iter().all(|v| matches!(v, ParameterValue::Integer(_))));
}

#[tokio::test]
async fn test_decimal_range_respects_precision_and_cap() {
    let config = RangeConfig {
        max_values: 4,
        ..RangeConfig::default()
    };
    let plans = planner(config).plan_for_lab("lab-1").await.unwrap();
    let atr = &plans[3];

    let values: Vec<f64> = atr.candidates().iter().filter_map(|v| v.as_f64()).collect();
    assert!(values.len() <= 4 && values.len() >= 2);
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    for v in values {
        let scaled = v * 100.0;
        assert!((scaled - scaled.round()).abs() < 1e-6, "{} has more than 2 decimals", v);
    }
}

#[tokio::test]
async fn test_disabled_names_from_config() {
    let config = RangeConfig {
        disabled_names: vec!["rsi length".to_string()],
        ..RangeConfig::default()
    };
    let plans = planner(config).plan_for_lab("lab-1").await.unwrap();
    assert_eq!(plans[0].action, PlanAction::Disable);
    assert!(plans[0].candidate_range.is_none() || plans[0].candidates().is_empty());
}

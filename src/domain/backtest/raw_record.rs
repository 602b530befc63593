//! Named accessors over loosely-typed backtest runtime records.
//!
//! Server versions disagree on key names and nesting, so every field the
//! analytics read goes through one accessor in this module. Each accessor
//! walks an alias chain in order and the first present, well-typed value wins.
//! Numbers may arrive as JSON numbers or numeric strings.
//!
//! | Field                | Alias chain                                                          |
//! |----------------------|----------------------------------------------------------------------|
//! | report sections      | `Reports`, `reports` (object: first key in key order; array: first)   |
//! | performance report   | `PR`, `performance`, `Performance` (inside a section, else top level) |
//! | starting balance     | `SB`, `starting_balance`, `StartingBalance`                           |
//! | profit history       | `RPH`, `realized_profit_history`, `profit_history`, `BalanceHistory`  |
//! | reported ROI         | `ROI`, `roi`, `ReturnOnInvestment`                                    |
//! | reported max DD      | `MDD`, `max_drawdown`, `MaxDrawdown`                                  |
//! | realized profits     | `RP`, `realized_profits`, `RealizedProfits`                           |
//! | closed positions     | `FinishedPositions`, `CompletedPositions`, `ClosedPositions`, `closed_positions` |
//! | parameter inputs     | `InputFields`, `Inputs`, `inputs`, `parameters`                       |
//! | script id / name     | `ScriptId`, `script_id` / `ScriptName`, `script_name`                 |
//! | market tag           | `Market`, `PriceMarket`, `market`, `market_tag`                       |
//! | generation index     | `Generation`, `generation_idx`, `GenerationIdx`                       |
//! | population index     | `Population`, `population_idx`, `PopulationIdx`                       |
//! | end time (unix secs) | `EndTime`, `end_time`, `ET`                                           |

use crate::domain::errors::RecordError;
use serde_json::{Map, Value};

const REPORT_SECTION_KEYS: &[&str] = &["Reports", "reports"];
const PERFORMANCE_KEYS: &[&str] = &["PR", "performance", "Performance"];
const STARTING_BALANCE_KEYS: &[&str] = &["SB", "starting_balance", "StartingBalance"];
const PROFIT_HISTORY_KEYS: &[&str] = &[
    "RPH",
    "realized_profit_history",
    "profit_history",
    "BalanceHistory",
];
const REPORTED_ROI_KEYS: &[&str] = &["ROI", "roi", "ReturnOnInvestment"];
const MAX_DRAWDOWN_KEYS: &[&str] = &["MDD", "max_drawdown", "MaxDrawdown"];
const REALIZED_PROFITS_KEYS: &[&str] = &["RP", "realized_profits", "RealizedProfits"];
const POSITION_LEDGER_KEYS: &[&str] = &[
    "FinishedPositions",
    "CompletedPositions",
    "ClosedPositions",
    "closed_positions",
];
const PARAMETER_KEYS: &[&str] = &["InputFields", "Inputs", "inputs", "parameters"];
const SCRIPT_ID_KEYS: &[&str] = &["ScriptId", "script_id"];
const SCRIPT_NAME_KEYS: &[&str] = &["ScriptName", "script_name"];
const MARKET_KEYS: &[&str] = &["Market", "PriceMarket", "market", "market_tag"];
const GENERATION_KEYS: &[&str] = &["Generation", "generation_idx", "GenerationIdx"];
const POPULATION_KEYS: &[&str] = &["Population", "population_idx", "PopulationIdx"];
const END_TIME_KEYS: &[&str] = &["EndTime", "end_time", "ET"];

// Position-level aliases
const POSITION_ID_KEYS: &[&str] = &["g", "id", "PositionId", "position_id"];
const POSITION_PROFIT_KEYS: &[&str] = &["rp", "realized_profit", "RealizedProfit"];
const POSITION_FEE_KEYS: &[&str] = &["fe", "fees", "Fees"];
const ENTRY_ORDER_KEYS: &[&str] = &["eno", "entry_orders", "EntryOrders"];
const MARGIN_KEYS: &[&str] = &["m", "margin", "Margin"];

// Parameter-level aliases, used when inputs arrive as a list of objects
const INPUT_NAME_KEYS: &[&str] = &["K", "key", "N", "name"];
const INPUT_VALUE_KEYS: &[&str] = &["V", "value"];

/// A raw runtime record as returned by the backtesting service.
///
/// Construction only checks that the payload is a JSON object; everything
/// else is resolved lazily through the accessors below.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

/// One closed position, normalized from whichever ledger shape the server used.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosition {
    pub id: String,
    pub realized_profit: f64,
    pub fees: f64,
    /// `None` when the position carries no entry-order list at all.
    pub entry_margins: Option<Vec<f64>>,
}

/// The performance section of a report.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceReport<'a> {
    section: &'a Map<String, Value>,
}

impl RawRecord {
    /// Wraps a parsed payload. Fails when the payload is not an object.
    pub fn new(root: Value) -> Result<Self, RecordError> {
        match root {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(RecordError::Null),
            other => Err(RecordError::NotAnObject(json_kind(&other))),
        }
    }

    /// Parses a JSON text payload.
    pub fn from_json_str(text: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(text)?;
        Self::new(value)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    fn object(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// First performance report, looked up inside the first report section
    /// (in the order the server sent them) and then at the top level of the
    /// record.
    pub fn performance_report(&self) -> Option<PerformanceReport<'_>> {
        let root = self.object();

        if let Some(sections) = first_of(root, REPORT_SECTION_KEYS) {
            let first_section = match sections {
                Value::Object(map) => map.values().find_map(Value::as_object),
                Value::Array(items) => items.iter().find_map(Value::as_object),
                _ => None,
            };
            if let Some(section) = first_section {
                if let Some(pr) = first_of(section, PERFORMANCE_KEYS).and_then(Value::as_object) {
                    return Some(PerformanceReport { section: pr });
                }
            }
        }

        first_of(root, PERFORMANCE_KEYS)
            .and_then(Value::as_object)
            .map(|section| PerformanceReport { section })
    }

    /// Closed positions in ledger order.
    ///
    /// Accepts a list of positions or an object keyed by position id. Returns
    /// `None` when no ledger key is present.
    pub fn closed_positions(&self) -> Option<Vec<RawPosition>> {
        let ledger = first_of(self.object(), POSITION_LEDGER_KEYS)?;

        let positions = match ledger {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| {
                    item.as_object()
                        .map(|obj| parse_position(obj, idx.to_string()))
                })
                .collect(),
            Value::Object(keyed) => keyed
                .iter()
                .filter_map(|(key, item)| {
                    item.as_object().map(|obj| parse_position(obj, key.clone()))
                })
                .collect(),
            _ => return None,
        };

        Some(positions)
    }

    /// Parameter inputs as (name, scalar value) pairs.
    ///
    /// Accepts an object of `name -> scalar`, an object of
    /// `name -> {V|value: scalar}`, or a list of `{K|key|N|name, V|value}`.
    pub fn parameter_inputs(&self) -> Option<Vec<(String, Value)>> {
        let inputs = first_of(self.object(), PARAMETER_KEYS)?;

        let pairs = match inputs {
            Value::Object(map) => map
                .iter()
                .filter_map(|(name, raw)| scalar_input(raw).map(|v| (name.clone(), v)))
                .collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|obj| {
                    let name = first_of(obj, INPUT_NAME_KEYS)?.as_str()?.to_string();
                    let value = first_of(obj, INPUT_VALUE_KEYS)?;
                    scalar(value).map(|v| (name, v))
                })
                .collect(),
            _ => return None,
        };

        Some(pairs)
    }

    pub fn script_id(&self) -> Option<String> {
        first_of(self.object(), SCRIPT_ID_KEYS).and_then(as_text)
    }

    pub fn script_name(&self) -> Option<String> {
        first_of(self.object(), SCRIPT_NAME_KEYS).and_then(as_text)
    }

    pub fn market_tag(&self) -> Option<String> {
        first_of(self.object(), MARKET_KEYS).and_then(as_text)
    }

    pub fn generation_idx(&self) -> Option<u32> {
        first_of(self.object(), GENERATION_KEYS)
            .and_then(as_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u32)
    }

    pub fn population_idx(&self) -> Option<u32> {
        first_of(self.object(), POPULATION_KEYS)
            .and_then(as_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u32)
    }

    /// Backtest end time in unix seconds.
    pub fn end_time(&self) -> Option<i64> {
        first_of(self.object(), END_TIME_KEYS)
            .and_then(as_f64)
            .map(|v| v as i64)
    }
}

impl<'a> PerformanceReport<'a> {
    pub fn starting_balance(&self) -> Option<f64> {
        first_of(self.section, STARTING_BALANCE_KEYS).and_then(as_f64)
    }

    /// Realized-profit history in recorded order. Non-numeric samples are dropped.
    pub fn profit_history(&self) -> Option<Vec<f64>> {
        first_of(self.section, PROFIT_HISTORY_KEYS)
            .and_then(Value::as_array)
            .map(|samples| samples.iter().filter_map(as_f64).collect())
    }

    pub fn reported_roi(&self) -> Option<f64> {
        first_of(self.section, REPORTED_ROI_KEYS).and_then(as_f64)
    }

    pub fn reported_max_drawdown(&self) -> Option<f64> {
        first_of(self.section, MAX_DRAWDOWN_KEYS).and_then(as_f64)
    }

    pub fn realized_profits(&self) -> Option<f64> {
        first_of(self.section, REALIZED_PROFITS_KEYS).and_then(as_f64)
    }
}

fn parse_position(obj: &Map<String, Value>, fallback_id: String) -> RawPosition {
    let id = first_of(obj, POSITION_ID_KEYS)
        .and_then(as_text)
        .unwrap_or(fallback_id);

    let entry_margins = first_of(obj, ENTRY_ORDER_KEYS).map(|orders| match orders {
        Value::Array(items) => items.iter().filter_map(order_margin).collect(),
        Value::Object(keyed) => keyed.values().filter_map(order_margin).collect(),
        _ => Vec::new(),
    });

    RawPosition {
        id,
        realized_profit: first_of(obj, POSITION_PROFIT_KEYS)
            .and_then(as_f64)
            .unwrap_or(0.0),
        fees: first_of(obj, POSITION_FEE_KEYS)
            .and_then(as_f64)
            .unwrap_or(0.0),
        entry_margins,
    }
}

fn order_margin(order: &Value) -> Option<f64> {
    order
        .as_object()
        .and_then(|o| first_of(o, MARGIN_KEYS))
        .and_then(as_f64)
}

/// First alias present with a non-null value.
fn first_of<'v>(map: &'v Map<String, Value>, aliases: &[&str]) -> Option<&'v Value> {
    aliases
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|v| !v.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Some(value.clone()),
        _ => None,
    }
}

fn scalar_input(raw: &Value) -> Option<Value> {
    match raw {
        Value::Object(obj) => first_of(obj, INPUT_VALUE_KEYS).and_then(scalar),
        other => scalar(other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_object_payloads() {
        assert!(RawRecord::new(json!([1, 2, 3])).is_err());
        assert!(RawRecord::new(Value::Null).is_err());
        assert!(RawRecord::from_json_str("{not json").is_err());
        assert!(RawRecord::new(json!({})).is_ok());
    }

    #[test]
    fn test_performance_report_inside_keyed_sections() {
        let record = RawRecord::new(json!({
            "Reports": {
                "BINANCE_BTC_USDT": {
                    "PR": { "SB": 5000, "RPH": [1, "2.5", null, -3], "ROI": "12.5", "MDD": 4.0 }
                }
            }
        }))
        .unwrap();

        let report = record.performance_report().unwrap();
        assert_eq!(report.starting_balance(), Some(5000.0));
        assert_eq!(report.profit_history(), Some(vec![1.0, 2.5, -3.0]));
        assert_eq!(report.reported_roi(), Some(12.5));
        assert_eq!(report.reported_max_drawdown(), Some(4.0));
        assert_eq!(report.realized_profits(), None);
    }

    #[test]
    fn test_first_section_follows_payload_order() {
        let record = RawRecord::from_json_str(
            r#"{"Reports":{"ZRX_USDT":{"PR":{"ROI":1.0}},"ADA_USDT":{"PR":{"ROI":2.0}}}}"#,
        )
        .unwrap();
        assert_eq!(record.performance_report().unwrap().reported_roi(), Some(1.0));

        let reparsed = RawRecord::from_json_str(&record.to_value().to_string()).unwrap();
        assert_eq!(reparsed.performance_report().unwrap().reported_roi(), Some(1.0));
    }

    #[test]
    fn test_rejection_reasons() {
        assert!(matches!(RawRecord::new(Value::Null), Err(RecordError::Null)));
        assert!(matches!(
            RawRecord::new(json!("text")),
            Err(RecordError::NotAnObject("string"))
        ));
        assert!(matches!(
            RawRecord::from_json_str("{"),
            Err(RecordError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_performance_report_top_level_fallback() {
        let record = RawRecord::new(json!({
            "performance": { "starting_balance": 100.0, "roi": 3.0 }
        }))
        .unwrap();

        let report = record.performance_report().unwrap();
        assert_eq!(report.starting_balance(), Some(100.0));
        assert_eq!(report.reported_roi(), Some(3.0));
        assert!(report.profit_history().is_none());
    }

    #[test]
    fn test_closed_positions_list_and_keyed_shapes() {
        let listed = RawRecord::new(json!({
            "FinishedPositions": [
                { "g": "p1", "rp": 130.0, "fe": 10.0, "eno": [{ "m": 600.0 }, { "m": 400.0 }] },
                { "rp": -35.0, "fe": 5.0 }
            ]
        }))
        .unwrap();
        let positions = listed.closed_positions().unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].id, "p1");
        assert_eq!(positions[0].entry_margins, Some(vec![600.0, 400.0]));
        assert_eq!(positions[1].id, "1");
        assert_eq!(positions[1].entry_margins, None);

        let keyed = RawRecord::new(json!({
            "closed_positions": {
                "abc": { "realized_profit": 10.0, "fees": 1.0, "entry_orders": { "o1": { "margin": 50.0 } } }
            }
        }))
        .unwrap();
        let positions = keyed.closed_positions().unwrap();
        assert_eq!(positions[0].id, "abc");
        assert_eq!(positions[0].entry_margins, Some(vec![50.0]));
    }

    #[test]
    fn test_parameter_input_shapes() {
        let mapped = RawRecord::new(json!({
            "InputFields": { "RSI Length": 14, "Mode": { "V": "fast" }, "Nested": { "x": [1] } }
        }))
        .unwrap();
        let inputs = mapped.parameter_inputs().unwrap();
        assert_eq!(inputs.len(), 2);

        let listed = RawRecord::new(json!({
            "inputs": [{ "K": "TP pct", "V": 1.5 }, { "name": "Enabled", "value": true }]
        }))
        .unwrap();
        let inputs = listed.parameter_inputs().unwrap();
        assert_eq!(inputs[0], ("TP pct".to_string(), json!(1.5)));
        assert_eq!(inputs[1], ("Enabled".to_string(), json!(true)));
    }

    #[test]
    fn test_identity_accessors() {
        let record = RawRecord::new(json!({
            "ScriptId": "s-1",
            "script_name": "RSI Bot",
            "PriceMarket": "BINANCE_ETH_USDT_",
            "generation_idx": 3,
            "Population": "7",
            "EndTime": 1_700_000_000
        }))
        .unwrap();

        assert_eq!(record.script_id().as_deref(), Some("s-1"));
        assert_eq!(record.script_name().as_deref(), Some("RSI Bot"));
        assert_eq!(record.market_tag().as_deref(), Some("BINANCE_ETH_USDT_"));
        assert_eq!(record.generation_idx(), Some(3));
        assert_eq!(record.population_idx(), Some(7));
        assert_eq!(record.end_time(), Some(1_700_000_000));
    }
}

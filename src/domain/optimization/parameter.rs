use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lab parameter as delivered by the collaborator, before typing.
///
/// Type codes: 0 integer, 1 decimal, 2 boolean, 3 string, 4 selection.
/// The first entry of `options` is the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLabParameter {
    #[serde(alias = "K")]
    pub key: String,
    #[serde(alias = "T")]
    pub type_code: i32,
    #[serde(alias = "O", default)]
    pub options: Vec<Value>,
    #[serde(alias = "D", default)]
    pub decimals: u32,
    #[serde(alias = "IE", default = "default_true")]
    pub is_enabled: bool,
    #[serde(alias = "IS", default)]
    pub is_selected: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    Integer,
    Decimal,
    Boolean,
    String,
    Selection,
}

impl ParameterKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ParameterKind::Integer,
            1 => ParameterKind::Decimal,
            2 => ParameterKind::Boolean,
            4 => ParameterKind::Selection,
            _ => ParameterKind::String,
        }
    }
}

/// Typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    String(String),
    Selection { selected: String, options: Vec<String> },
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Integer(v) => Some(*v as f64),
            ParameterValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Integer(v) => write!(f, "{}", v),
            ParameterValue::Decimal(v) => write!(f, "{}", v),
            ParameterValue::Boolean(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
            ParameterValue::Selection { selected, .. } => write!(f, "{}", selected),
        }
    }
}

/// A lab parameter with its current value typed once at the boundary.
///
/// A numeric parameter whose current value does not parse keeps its raw text
/// as `ParameterValue::String`, so downstream planning leaves it alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabParameter {
    pub key: String,
    pub kind: ParameterKind,
    pub value: ParameterValue,
    pub decimals: u32,
    pub is_enabled: bool,
    pub is_selected: bool,
}

impl LabParameter {
    pub fn new(key: impl Into<String>, value: ParameterValue, decimals: u32) -> Self {
        let kind = match &value {
            ParameterValue::Integer(_) => ParameterKind::Integer,
            ParameterValue::Decimal(_) => ParameterKind::Decimal,
            ParameterValue::Boolean(_) => ParameterKind::Boolean,
            ParameterValue::String(_) => ParameterKind::String,
            ParameterValue::Selection { .. } => ParameterKind::Selection,
        };
        Self {
            key: key.into(),
            kind,
            value,
            decimals,
            is_enabled: true,
            is_selected: false,
        }
    }

    pub fn from_raw(raw: &RawLabParameter) -> Self {
        let kind = ParameterKind::from_code(raw.type_code);
        let current = raw.options.first();
        let text = current.map(value_text).unwrap_or_default();

        let value = match kind {
            ParameterKind::Integer => current
                .and_then(as_f64)
                .filter(|v| v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                .map(|v| ParameterValue::Integer(v as i64)),
            ParameterKind::Decimal => current.and_then(as_f64).map(ParameterValue::Decimal),
            ParameterKind::Boolean => current.and_then(as_bool).map(ParameterValue::Boolean),
            ParameterKind::Selection => Some(ParameterValue::Selection {
                selected: text.clone(),
                options: raw.options.iter().map(value_text).collect(),
            }),
            ParameterKind::String => None,
        }
        .unwrap_or(ParameterValue::String(text));

        Self {
            key: raw.key.clone(),
            kind,
            value,
            decimals: raw.decimals,
            is_enabled: raw.is_enabled,
            is_selected: raw.is_selected,
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

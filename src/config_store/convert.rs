use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::ConfigError;

/// The shape a caller expects a config value to have.
///
/// `Any` skips the check entirely. `List`, `Tuple` and `Set` all describe
/// JSON arrays; they differ only in how a non-array is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Accept whatever is stored.
    #[default]
    Any,
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool,
    /// Integral JSON number.
    Int,
    /// Fractional JSON number.
    Float,
    /// JSON string.
    Str,
    /// JSON array.
    List,
    /// JSON array, converted like a list.
    Tuple,
    /// JSON array without duplicates.
    Set,
    /// JSON object.
    Dict,
}

impl ValueKind {
    /// Whether `value` already has this shape.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Null => value.is_null(),
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_f64(),
            Self::Str => value.is_string(),
            Self::List | Self::Tuple | Self::Set => value.is_array(),
            Self::Dict => value.is_object(),
        }
    }

    /// Best-effort conversion of `value` into this shape.
    ///
    /// Returns `None` when no sensible conversion exists.
    pub fn convert(self, value: &Value) -> Option<Value> {
        match self {
            Self::Any => Some(value.clone()),
            Self::Null => value.is_null().then_some(Value::Null),
            Self::Str => Some(Value::String(render_text(value))),
            Self::Int => to_int(value).map(Value::from),
            Self::Float => to_float(value).and_then(Number::from_f64).map(Value::Number),
            Self::Bool => Some(Value::Bool(truthy(value))),
            Self::List | Self::Tuple => elements(value).map(Value::Array),
            Self::Set => elements(value).map(|items| {
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Value::Array(unique)
            }),
            Self::Dict => elements(value).map(|items| {
                let enumerated: Map<String, Value> = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item))
                    .collect();
                Value::Object(enumerated)
            }),
        }
    }

    /// Resolves a stored value against this kind.
    ///
    /// Returns the value unchanged when it already matches, the converted
    /// value when `auto_convert` is set and conversion succeeds, and `None`
    /// otherwise.
    pub fn resolve(self, value: Value, auto_convert: bool) -> Option<Value> {
        if self.matches(&value) {
            Some(value)
        } else if auto_convert {
            self.convert(&value)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Set => "set",
            Self::Dict => "dict",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "any" => Self::Any,
            "null" | "none" => Self::Null,
            "bool" | "boolean" => Self::Bool,
            "int" | "integer" => Self::Int,
            "float" | "number" => Self::Float,
            "str" | "string" => Self::Str,
            "list" | "array" => Self::List,
            "tuple" => Self::Tuple,
            "set" => Self::Set,
            "dict" | "object" => Self::Dict,
            other => {
                return Err(ConfigError::InvalidArgument {
                    field: "value kind",
                    reason: format!("unknown kind '{other}'"),
                });
            }
        };

        Ok(kind)
    }
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Iterates a value the way a sequence conversion sees it: array items,
/// string characters, or object keys.
fn elements(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Some(map.keys().cloned().map(Value::String).collect()),
        _ => None,
    }
}

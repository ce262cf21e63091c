//! Custom serde helpers for exchange and price-feed wire formats.
//!
//! The exchange is loose about scalar encodings: ids and timestamps arrive as
//! either JSON numbers or strings, odds as numbers or numeric strings.

use serde_json::Value;

/// Deserializes a `String` from either a JSON string or a JSON number.
pub mod string_or_number {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "Expected string or number, got {}",
                other
            ))),
        }
    }
}

/// Deserializes an `i64` from a JSON number or an integer string.
pub mod lenient_i64 {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        super::value_as_i64(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid integer: {}", value)))
    }
}

/// Deserializes an optional `f64` from a JSON number or numeric string.
/// Unparseable values become `None` instead of failing the whole document.
pub mod lenient_f64_opt {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(super::value_as_f64))
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Renders a scalar as the key the exchange uses for it (`3.5`, `"-1"`).
pub fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Loose truthiness, matching how status flags are set on the exchange:
/// `null`, `false`, `0` and `""` are unset, everything else is set.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

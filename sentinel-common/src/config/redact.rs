//! Redacted views of resolved section values.
//!
//! Redaction is a view, never a transformation: the resolved value keeps the
//! real secrets so live services receive usable configuration, while the
//! inspection surface only learns whether a sensitive option was set.

use serde_json::{Map, Value};

/// Option map of a single section value with sensitive options replaced by
/// a boolean "was it set to a non-zero value?" indicator.
pub(crate) fn redact_options(value: &Value, redacted: &[&str]) -> Map<String, Value> {
    let mut options = Map::new();
    if let Some(map) = value.as_object() {
        for (name, option) in map {
            if redacted.contains(&name.as_str()) {
                options.insert(name.clone(), Value::Bool(!is_zero(option)));
            } else {
                options.insert(name.clone(), option.clone());
            }
        }
    }
    options
}

/// Structural zero check: null, false, numeric zero, the empty string,
/// arrays whose elements are all zero, and objects whose values are all
/// zero.
pub(crate) fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u == 0
            } else if let Some(i) = n.as_i64() {
                i == 0
            } else {
                n.as_f64() == Some(0.0)
            }
        }
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.iter().all(is_zero),
        Value::Object(map) => map.values().all(is_zero),
    }
}

//! Weakly-typed assignment of incoming option values.
//!
//! Override values arrive as untyped JSON. The destination slot inside the
//! working tree still carries the shape of the original typed field, so the
//! assignment can convert numeric values to the destination's numeric
//! flavor and parse numeric strings, instead of demanding an exact match.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Coercion failures. These are always caused by the incoming value.
#[derive(Debug, Error)]
pub enum CoerceError {
    #[error("wrong kind {got}, expected value of kind {expected}")]
    WrongKind {
        got: &'static str,
        expected: &'static str,
    },

    #[error("cannot parse {value:?} as {kind}")]
    ParseNumber { value: String, kind: &'static str },

    #[error("non-finite number {value} cannot be represented")]
    NonFinite { value: String },
}

/// JSON kind name of a value, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Assign `src` into `dst`, keeping the numeric flavor already present in
/// `dst`.
///
/// Rules, in priority order:
/// 1. `dst` is null (an unset optional field): accept `src` verbatim.
/// 2. Matching scalar kinds: replace; numbers convert to `dst`'s flavor.
/// 3. Matching object kinds: rebuild from `src`'s keys, coercing each value
///    against the destination's value for that key when one exists.
/// 4. Matching array kinds: rebuild from `src`'s items, coercing each
///    against the destination's first element when one exists.
/// 5. Numeric `dst`, string `src`: parse the string.
/// 6. Anything else fails with the kinds named.
///
/// Exact integer width is restored later when the resolved section is
/// decoded into its typed form.
pub fn coerce(dst: &mut Value, src: Value) -> Result<(), CoerceError> {
    if dst.is_null() {
        *dst = src;
        return Ok(());
    }
    match src {
        Value::Bool(b) => match dst {
            Value::Bool(slot) => {
                *slot = b;
                Ok(())
            }
            _ => Err(wrong_kind("boolean", dst)),
        },
        Value::Number(n) => match dst {
            Value::Number(slot) => {
                let converted = convert_number(slot, &n)?;
                *slot = converted;
                Ok(())
            }
            _ => Err(wrong_kind("number", dst)),
        },
        Value::String(s) => match dst {
            Value::String(slot) => {
                *slot = s;
                Ok(())
            }
            Value::Number(slot) => {
                let parsed = parse_number(slot, &s)?;
                *slot = parsed;
                Ok(())
            }
            _ => Err(wrong_kind("string", dst)),
        },
        Value::Object(src_map) => match dst {
            Value::Object(dst_map) => {
                let mut rebuilt = Map::new();
                for (key, src_value) in src_map {
                    match dst_map.get(&key) {
                        Some(template) => {
                            let mut slot = template.clone();
                            coerce(&mut slot, src_value)?;
                            rebuilt.insert(key, slot);
                        }
                        // Open maps accept keys the original never had.
                        None => {
                            rebuilt.insert(key, src_value);
                        }
                    }
                }
                *dst_map = rebuilt;
                Ok(())
            }
            _ => Err(wrong_kind("object", dst)),
        },
        Value::Array(src_items) => match dst {
            Value::Array(dst_items) => {
                let template = dst_items.first().cloned();
                let mut rebuilt = Vec::with_capacity(src_items.len());
                for src_value in src_items {
                    match &template {
                        Some(t) => {
                            let mut slot = t.clone();
                            coerce(&mut slot, src_value)?;
                            rebuilt.push(slot);
                        }
                        None => rebuilt.push(src_value),
                    }
                }
                *dst_items = rebuilt;
                Ok(())
            }
            _ => Err(wrong_kind("array", dst)),
        },
        Value::Null => Err(wrong_kind("null", dst)),
    }
}

fn wrong_kind(got: &'static str, dst: &Value) -> CoerceError {
    CoerceError::WrongKind {
        got,
        expected: kind_of(dst),
    }
}

/// Convert `src` to the numeric flavor of `dst`. Narrowing is not
/// range-checked: floats truncate into integer destinations and sign
/// conversions wrap, exactly as a native numeric cast would.
fn convert_number(dst: &Number, src: &Number) -> Result<Number, CoerceError> {
    if dst.is_f64() {
        let f = src
            .as_f64()
            .ok_or_else(|| CoerceError::NonFinite {
                value: src.to_string(),
            })?;
        return Number::from_f64(f).ok_or_else(|| CoerceError::NonFinite {
            value: src.to_string(),
        });
    }
    if dst.is_u64() {
        if let Some(u) = src.as_u64() {
            return Ok(Number::from(u));
        }
        if let Some(i) = src.as_i64() {
            return Ok(Number::from(i as u64));
        }
        if let Some(f) = src.as_f64() {
            return Ok(Number::from(f as u64));
        }
    } else {
        if let Some(i) = src.as_i64() {
            return Ok(Number::from(i));
        }
        if let Some(u) = src.as_u64() {
            return Ok(Number::from(u as i64));
        }
        if let Some(f) = src.as_f64() {
            return Ok(Number::from(f as i64));
        }
    }
    Err(CoerceError::NonFinite {
        value: src.to_string(),
    })
}

/// Parse a string into the numeric flavor of `dst`.
fn parse_number(dst: &Number, src: &str) -> Result<Number, CoerceError> {
    if dst.is_f64() {
        let f = src.parse::<f64>().map_err(|_| CoerceError::ParseNumber {
            value: src.to_string(),
            kind: "float",
        })?;
        return Number::from_f64(f).ok_or_else(|| CoerceError::NonFinite {
            value: src.to_string(),
        });
    }
    if let Ok(i) = src.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = src.parse::<u64>() {
        return Ok(Number::from(u));
    }
    Err(CoerceError::ParseNumber {
        value: src.to_string(),
        kind: "integer",
    })
}

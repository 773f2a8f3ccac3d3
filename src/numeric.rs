//! Numeric coercion: arbitrary upstream input → finite `f64` or absent.
//!
//! Absence is a normal result here, never an error.

use serde_json::Value;

/// Coerce a JSON value into a finite number.
///
/// Accepts numbers and numeric-looking strings (surrounding whitespace is
/// ignored). `null`, booleans, arrays, objects, unparsable strings and
/// non-finite results all map to `None`.
pub fn coerce(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => coerce_str(s),
        _ => None,
    }
}

/// Coerce a string such as `"36.45"` or `" 1e3 "`.
pub fn coerce_str(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Keep an already-numeric value only if it is finite.
pub fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// Look up a JSON pointer and coerce whatever sits there.
pub fn coerce_at(payload: &Value, pointer: &str) -> Option<f64> {
    payload.pointer(pointer).and_then(coerce)
}

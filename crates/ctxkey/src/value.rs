//! Truthiness, loose equality and ordering for context values.
//!
//! Context values are plain `serde_json::Value`s. A key that is not present
//! anywhere in a context chain is represented as `None`. The helpers here
//! define how rules look at those values: which values count as "set", when a
//! rule literal matches a stored value, and how literals are ordered when
//! rules are canonicalized.

use std::cmp::Ordering;

use serde_json::{Number, Value};

/// True when a context value counts as set for `Defined`/`Not` rules.
///
/// Absent values, `null`, `false`, `0`, NaN and the empty string are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => {
            let f = number_to_f64(n);
            f != 0.0 && !f.is_nan()
        }
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Coercing equality between a stored context value and a rule literal.
///
/// Strings are compared numerically against numbers, booleans match the
/// strings `"true"`/`"false"` and the numbers `1`/`0`, and an absent value is
/// only equal to `null`.
pub fn loose_eq(stored: Option<&Value>, literal: &Value) -> bool {
    let Some(stored) = stored else {
        return literal.is_null();
    };
    match (stored, literal) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => number_to_f64(a) == number_to_f64(b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            string_to_f64(s) == number_to_f64(n)
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            bool_matches_str(*b, s)
        }
        (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
            number_to_f64(n) == bool_to_f64(*b)
        }
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            stored == literal
        }
        _ => false,
    }
}

/// Render a value the way rules see it as text.
///
/// Used when matching regex rules and when writing `==`/`!=` literals.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Total order over values used to canonicalize rule literals.
///
/// Values of different kinds order by kind (null, bool, number, string,
/// array, object); compound values order by their JSON text.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => number_to_f64(x).total_cmp(&number_to_f64(y)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Position of a value's kind in the cross-kind order.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Widen a JSON number to `f64`.
fn number_to_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Numeric reading of a string: trimmed, empty means zero, junk means NaN.
fn string_to_f64(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Numeric reading of a boolean.
fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Whether `s` spells boolean `b`, either by name or numerically.
fn bool_matches_str(b: bool, s: &str) -> bool {
    let name = if b { "true" } else { "false" };
    s.trim() == name || string_to_f64(s) == bool_to_f64(b)
}

/// Integral numbers print without a fractional part.
fn display_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    // f64's Display already drops a zero fraction (14.0 prints as "14").
    number_to_f64(n).to_string()
}

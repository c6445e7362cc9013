//! Numeric coercion and the shared comparison ladder
//!
//! Record values are untyped, so "is this a number" is a question every engine
//! asks constantly. Two coercions exist: a lenient one that answers with
//! `None` (used by aggregation buckets and filters, where a non-number simply
//! does not contribute), and a strict one that errors (used by expression
//! arithmetic, where the caller turns the error into a warning).

use std::cmp::Ordering;

use crate::value::Value;

/// Lenient numeric coercion.
///
/// Numbers pass through, booleans become 1/0, and strings parse after
/// trimming, with a comma accepted as decimal separator. Everything else is
/// `None`.
#[must_use]
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

/// Strict numeric coercion. Same ladder as [`to_number`] but non-coercible
/// values are an error instead of `None`.
pub fn coerce_number(value: &Value) -> anyhow::Result<f64> {
    to_number(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot convert {} value '{}' to a number",
            value.type_name(),
            value
        )
    })
}

/// Parse a trimmed string as a number, tolerating a comma decimal separator.
#[must_use]
pub fn parse_number_str(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Whether a value coerces to a number leniently.
#[must_use]
pub fn looks_numeric(value: &Value) -> bool {
    to_number(value).is_some()
}

/// Equality for the expression engine and filter membership.
///
/// Nulls equal only each other; two numerically coercible values compare as
/// numbers; everything else compares on rendered strings.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return x == y;
    }
    a.to_string() == b.to_string()
}

/// Ordering for the expression engine's relational operators.
///
/// `None` when either side is null (all relational comparisons against null
/// are false). Numerically coercible pairs compare as numbers, otherwise as
/// strings.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return x.partial_cmp(&y);
    }
    Some(a.to_string().cmp(&b.to_string()))
}

/// Case-insensitive string ordering used by dimension-value sorts.
#[must_use]
pub fn casefold_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

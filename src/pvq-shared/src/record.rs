//! Ordered records and field resolution
//!
//! A record is an insertion-ordered map of field keys to values. Field
//! resolution is more than a map lookup: report configs reference virtual
//! date-part keys, dotted paths into nested objects, and prefix-qualified join
//! output, so lookups walk a fallback chain.

use indexmap::IndexMap;

use crate::date::{date_part_value, parse_date, parse_date_part_key};
use crate::value::Value;

/// A single data record.
pub type Record = IndexMap<String, Value>;

/// Build a record from key/value pairs. Test and fixture helper.
pub fn record_from<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Resolve a field key against a record.
///
/// The chain, in order: exact key, virtual date-part key, dotted-path
/// traversal into nested objects, and finally the path's trailing segment as
/// a flat top-level key. The last step exists because join output is merged
/// under `"prefix.field"` keys that configs also spell as dotted paths.
///
/// `None` means the field is missing; `Some(Value::Null)` means it is present
/// and null.
#[must_use]
pub fn resolve_field(record: &Record, key: &str) -> Option<Value> {
    if let Some(value) = record.get(key) {
        return Some(value.clone());
    }

    if let Some((base, part)) = parse_date_part_key(key) {
        let base_value = resolve_field(record, base)?;
        return match parse_date(&base_value) {
            Some(dt) => Some(Value::String(date_part_value(dt, part))),
            None => Some(Value::Null),
        };
    }

    if key.contains('.') {
        if let Some(value) = resolve_path(record, key) {
            return Some(value);
        }
        if let Some(last) = key.rsplit('.').next() {
            if let Some(value) = record.get(last) {
                return Some(value.clone());
            }
        }
    }

    None
}

fn resolve_path(record: &Record, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?.clone();
    for segment in segments {
        match current {
            Value::Object(ref obj) => {
                current = obj.get(segment)?.clone();
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Normalize a value into the string form used for grouping and lookup keys.
///
/// Null is the empty string, scalars render as displayed, and composites
/// render as canonical JSON with object keys sorted so that equal contents
/// produce equal keys regardless of insertion order.
#[must_use]
pub fn normalize_key_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => canonical_json(value),
        other => other.to_string(),
    }
}

/// A typed signature for ambiguity and distinct detection: `"{type}:{key}"`.
///
/// The type prefix keeps `Int(1)` and `String("1")` distinct where that
/// distinction matters (value aggregation, distinct counting).
#[must_use]
pub fn value_signature(value: &Value) -> String {
    format!("{}:{}", value.type_name(), normalize_key_value(value))
}

/// Canonical JSON rendering with object keys sorted recursively.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sorted_json(value).to_string()
}

fn sorted_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Array(arr) => serde_json::Value::Array(arr.iter().map(sorted_json).collect()),
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut map = serde_json::Map::new();
            for k in keys {
                if let Some(v) = obj.get(k) {
                    map.insert(k.clone(), sorted_json(v));
                }
            }
            serde_json::Value::Object(map)
        }
        other => other.to_json(),
    }
}

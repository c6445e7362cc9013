//! Filter resolution and record predicates
//!
//! Filter payloads arrive in several historical shapes: a bare scalar, a bare
//! list, a `{mode, items}` selection, or a `{start, end}` range. Shape
//! sniffing happens exactly once, at parse time, producing tagged selections;
//! everything downstream works on the tagged form.

mod options;

pub use options::{collect_options, FilterOption, FilterOptionsResult};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use pvq_shared::date::{epoch_ms, parse_date_part_key, parse_date_str};
use pvq_shared::num::to_number;
use pvq_shared::record::{normalize_key_value, resolve_field, Record};
use pvq_shared::value::Value;

use crate::error::{Error, Result};

/// Sentinel item matching null and blank values in a values selection.
pub const BLANK_SENTINEL: &str = "__BLANK__";

/// Whether a values selection keeps or drops its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Keep records whose value is among the items
    Include,
    /// Drop records whose value is among the items
    Exclude,
}

/// A discrete-values selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesSelection {
    /// Keep or drop members
    pub mode: SelectionMode,
    /// Selected items
    pub items: Vec<Value>,
}

/// An inclusive range selection. Open ends are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSelection {
    /// Lower bound
    pub start: Option<Value>,
    /// Upper bound
    pub end: Option<Value>,
}

/// One field's filter, shape-resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSelection {
    /// Discrete values
    Values(ValuesSelection),
    /// Inclusive range
    Range(RangeSelection),
}

/// Filters keyed by field, in configuration order.
pub type FilterSet = IndexMap<String, FilterSelection>;

/// Resolved field type, driving range math and option sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Compared and sorted as text
    String,
    /// Compared numerically
    Number,
    /// Compared via epoch milliseconds
    Date,
}

/// Declared field types from report metadata, keyed by field.
pub type FieldTypes = IndexMap<String, FieldType>;

/// Parse a raw filter map (field key to selection payload).
pub fn parse_filters(raw: &JsonValue) -> Result<FilterSet> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("filters must be an object keyed by field"))?;
    let mut set = FilterSet::new();
    for (key, payload) in obj {
        set.insert(key.clone(), parse_selection(payload)?);
    }
    Ok(set)
}

/// Parse one selection payload into its tagged form.
pub fn parse_selection(raw: &JsonValue) -> Result<FilterSelection> {
    match raw {
        JsonValue::Array(items) => Ok(FilterSelection::Values(ValuesSelection {
            mode: SelectionMode::Include,
            items: items.iter().cloned().map(Value::from_json).collect(),
        })),
        JsonValue::Object(obj) => parse_selection_object(obj),
        scalar => Ok(FilterSelection::Values(ValuesSelection {
            mode: SelectionMode::Include,
            items: vec![Value::from_json(scalar.clone())],
        })),
    }
}

fn parse_selection_object(obj: &serde_json::Map<String, JsonValue>) -> Result<FilterSelection> {
    let mode = obj.get("mode").and_then(JsonValue::as_str);

    // An explicit mode of "ranges" forces range interpretation even when the
    // bounds are absent (an empty range matches everything).
    let has_range_keys = ["start", "from", "end", "to"]
        .iter()
        .any(|k| obj.contains_key(*k));
    if mode == Some("ranges") || (has_range_keys && !obj.contains_key("items")) {
        let start = obj.get("start").or_else(|| obj.get("from"));
        let end = obj.get("end").or_else(|| obj.get("to"));
        return Ok(FilterSelection::Range(RangeSelection {
            start: start.filter(|v| !v.is_null()).cloned().map(Value::from_json),
            end: end.filter(|v| !v.is_null()).cloned().map(Value::from_json),
        }));
    }

    if let Some(items) = obj.get("items") {
        let items = match items {
            JsonValue::Array(arr) => arr.iter().cloned().map(Value::from_json).collect(),
            other => vec![Value::from_json(other.clone())],
        };
        let mode = match mode {
            Some("exclude") => SelectionMode::Exclude,
            _ => SelectionMode::Include,
        };
        return Ok(FilterSelection::Values(ValuesSelection { mode, items }));
    }

    match mode {
        Some("values") => Ok(FilterSelection::Values(ValuesSelection {
            mode: SelectionMode::Include,
            items: Vec::new(),
        })),
        _ => {
            // No recognized shape: the whole object is one selected item
            Ok(FilterSelection::Values(ValuesSelection {
                mode: SelectionMode::Include,
                items: vec![Value::from_json(JsonValue::Object(obj.clone()))],
            }))
        }
    }
}

/// Layer filter sets: later layers replace earlier ones per key, wholesale.
#[must_use]
pub fn merge_layers(layers: &[&FilterSet]) -> FilterSet {
    let mut merged = FilterSet::new();
    for layer in layers {
        for (key, selection) in layer.iter() {
            merged.insert(key.clone(), selection.clone());
        }
    }
    merged
}

/// Resolve the effective type of a field.
///
/// Virtual date-part keys are always strings. A declared date type is
/// verified against the data: when nothing parses as a date the inferred
/// type wins (bad metadata must not blank out a range filter).
#[must_use]
pub fn resolve_field_type(field: &str, meta: &FieldTypes, records: &[Record]) -> FieldType {
    if parse_date_part_key(field).is_some() {
        return FieldType::String;
    }
    let declared = meta.get(field).copied();
    match declared {
        Some(FieldType::Date) => {
            if records
                .iter()
                .filter_map(|r| resolve_field(r, field))
                .any(|v| !v.is_blank() && epoch_ms(&v).is_some())
            {
                FieldType::Date
            } else {
                infer_field_type(field, records)
            }
        }
        Some(other) => other,
        None => infer_field_type(field, records),
    }
}

/// Infer a field's type from its non-blank values: all date-formatted makes a
/// date, all numeric makes a number, anything else makes a string.
#[must_use]
pub fn infer_field_type(field: &str, records: &[Record]) -> FieldType {
    let mut saw_any = false;
    let mut all_dates = true;
    let mut all_numbers = true;
    for record in records {
        let Some(value) = resolve_field(record, field) else {
            continue;
        };
        if value.is_blank() {
            continue;
        }
        saw_any = true;
        if to_number(&value).is_some() {
            all_dates = false;
        } else if value.as_str().is_some_and(|s| parse_date_str(s).is_some()) {
            all_numbers = false;
        } else {
            all_dates = false;
            all_numbers = false;
        }
        if !all_dates && !all_numbers {
            break;
        }
    }
    if !saw_any {
        FieldType::String
    } else if all_dates {
        FieldType::Date
    } else if all_numbers {
        FieldType::Number
    } else {
        FieldType::String
    }
}

/// Resolve types for every filtered field.
#[must_use]
pub fn resolve_filter_types(filters: &FilterSet, meta: &FieldTypes, records: &[Record]) -> FieldTypes {
    filters
        .keys()
        .map(|key| (key.clone(), resolve_field_type(key, meta, records)))
        .collect()
}

/// Whether one record passes every filter in the set.
#[must_use]
pub fn record_passes(record: &Record, filters: &FilterSet, types: &FieldTypes) -> bool {
    filters.iter().all(|(key, selection)| {
        let value = resolve_field(record, key).unwrap_or(Value::Null);
        let field_type = types.get(key).copied().unwrap_or(FieldType::String);
        selection_matches(selection, &value, field_type, key)
    })
}

fn selection_matches(
    selection: &FilterSelection,
    value: &Value,
    field_type: FieldType,
    key: &str,
) -> bool {
    match selection {
        FilterSelection::Values(values) => values_match(values, value),
        FilterSelection::Range(range) => range_matches(range, value, field_type, key),
    }
}

fn values_match(selection: &ValuesSelection, value: &Value) -> bool {
    if selection.items.is_empty() {
        // An empty selection constrains nothing
        return true;
    }
    let blank = value.is_blank();
    let normalized = normalize_key_value(value);
    let member = selection.items.iter().any(|item| {
        if item.as_str() == Some(BLANK_SENTINEL) {
            blank
        } else {
            normalize_key_value(item) == normalized
        }
    });
    match selection.mode {
        SelectionMode::Include => member,
        SelectionMode::Exclude => !member,
    }
}

fn range_matches(range: &RangeSelection, value: &Value, field_type: FieldType, key: &str) -> bool {
    // Date-part keys and plain string fields are never range-filtered
    if field_type == FieldType::String {
        log::debug!("range filter on string-typed field '{key}' ignored");
        return true;
    }
    if range.start.is_none() && range.end.is_none() {
        return true;
    }

    let coerce = |v: &Value| -> Option<f64> {
        match field_type {
            FieldType::Date => epoch_ms(v).map(|ms| ms as f64),
            FieldType::Number => to_number(v),
            FieldType::String => None,
        }
    };

    // A record value the range cannot interpret fails the filter
    let Some(v) = coerce(value) else {
        return false;
    };
    // Bounds that fail to coerce are treated as open
    if let Some(start) = range.start.as_ref().and_then(|b| coerce(b)) {
        if v < start {
            return false;
        }
    }
    if let Some(end) = range.end.as_ref().and_then(|b| coerce(b)) {
        if v > end {
            return false;
        }
    }
    true
}

/// Apply a filter set, keeping passing records.
#[must_use]
pub fn apply_filters(records: Vec<Record>, filters: &FilterSet, types: &FieldTypes) -> Vec<Record> {
    if filters.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| record_passes(record, filters, types))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;
    use serde_json::json;

    fn records() -> Vec<Record> {
        vec![
            record_from([
                ("cls", Value::string("west")),
                ("value", Value::Int(10)),
                ("created", Value::string("2026-01-10")),
            ]),
            record_from([
                ("cls", Value::string("east")),
                ("value", Value::Int(25)),
                ("created", Value::string("2026-02-10")),
            ]),
            record_from([
                ("cls", Value::Null),
                ("value", Value::string("n/a")),
                ("created", Value::string("2026-03-10")),
            ]),
        ]
    }

    #[test]
    fn test_parse_shapes() {
        // bare scalar
        assert_eq!(
            parse_selection(&json!("west")).unwrap(),
            FilterSelection::Values(ValuesSelection {
                mode: SelectionMode::Include,
                items: vec![Value::string("west")],
            })
        );
        // bare list
        let parsed = parse_selection(&json!(["a", "b"])).unwrap();
        assert!(matches!(
            parsed,
            FilterSelection::Values(ValuesSelection { ref items, .. }) if items.len() == 2
        ));
        // selection dict
        let parsed = parse_selection(&json!({"mode": "exclude", "items": ["a"]})).unwrap();
        assert!(matches!(
            parsed,
            FilterSelection::Values(ValuesSelection {
                mode: SelectionMode::Exclude,
                ..
            })
        ));
        // range dicts in both spellings
        let parsed = parse_selection(&json!({"start": 1, "end": 5})).unwrap();
        assert!(matches!(parsed, FilterSelection::Range(_)));
        let parsed = parse_selection(&json!({"from": 1, "to": 5})).unwrap();
        assert!(matches!(parsed, FilterSelection::Range(_)));
        // explicit mode wins
        let parsed = parse_selection(&json!({"mode": "ranges"})).unwrap();
        assert!(matches!(parsed, FilterSelection::Range(_)));
    }

    #[test]
    fn test_merge_layers_replaces_per_key() {
        let defaults = parse_filters(&json!({"cls": ["west"], "value": {"start": 1}})).unwrap();
        let container = parse_filters(&json!({"cls": ["east"]})).unwrap();
        let merged = merge_layers(&[&defaults, &container]);
        assert_eq!(merged.len(), 2);
        assert!(matches!(
            merged.get("cls"),
            Some(FilterSelection::Values(ValuesSelection { items, .. })) if items == &vec![Value::string("east")]
        ));
    }

    #[test]
    fn test_values_filter_include_exclude() {
        let recs = records();
        let filters = parse_filters(&json!({"cls": ["west"]})).unwrap();
        let types = resolve_filter_types(&filters, &FieldTypes::new(), &recs);
        let out = apply_filters(recs.clone(), &filters, &types);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("cls"), Some(&Value::string("west")));

        let filters =
            parse_filters(&json!({"cls": {"mode": "exclude", "items": ["west"]}})).unwrap();
        let out = apply_filters(recs, &filters, &types);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_blank_sentinel() {
        let recs = records();
        let filters = parse_filters(&json!({"cls": ["__BLANK__"]})).unwrap();
        let types = resolve_filter_types(&filters, &FieldTypes::new(), &recs);
        let out = apply_filters(recs, &filters, &types);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("cls"), Some(&Value::Null));
    }

    #[test]
    fn test_numeric_range() {
        let recs = records();
        let filters = parse_filters(&json!({"value": {"start": 5, "end": 20}})).unwrap();
        // mixed numeric and text values infer as string, so declare the type
        let mut meta = FieldTypes::new();
        meta.insert("value".to_string(), FieldType::Number);
        let types = resolve_filter_types(&filters, &meta, &recs);
        let out = apply_filters(recs, &filters, &types);
        // the "n/a" record cannot be interpreted and fails the range
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("value"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_date_range() {
        let recs = records();
        let filters = parse_filters(
            &json!({"created": {"start": "2026-01-15", "end": "2026-02-28"}}),
        )
        .unwrap();
        let types = resolve_filter_types(&filters, &FieldTypes::new(), &recs);
        assert_eq!(types.get("created"), Some(&FieldType::Date));
        let out = apply_filters(recs, &filters, &types);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("created"), Some(&Value::string("2026-02-10")));
    }

    #[test]
    fn test_date_part_keys_are_strings() {
        let recs = records();
        let filters = parse_filters(&json!({"created__date_part__month": ["02"]})).unwrap();
        let types = resolve_filter_types(&filters, &FieldTypes::new(), &recs);
        assert_eq!(
            types.get("created__date_part__month"),
            Some(&FieldType::String)
        );
        let out = apply_filters(recs, &filters, &types);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_declared_date_without_dates_downgrades() {
        let recs = vec![
            record_from([("value", Value::Int(5))]),
            record_from([("value", Value::Int(9))]),
        ];
        let mut meta = FieldTypes::new();
        meta.insert("value".to_string(), FieldType::Date);
        // numbers technically parse as epochs, so the declaration is verified
        // against the data and holds here
        let resolved = resolve_field_type("value", &meta, &recs);
        assert_eq!(resolved, FieldType::Date);

        let recs = vec![record_from([("value", Value::string("west"))])];
        let resolved = resolve_field_type("value", &meta, &recs);
        assert_eq!(resolved, FieldType::String);
    }

    #[test]
    fn test_empty_selection_matches_everything() {
        let recs = records();
        let filters = parse_filters(&json!({"cls": []})).unwrap();
        let types = resolve_filter_types(&filters, &FieldTypes::new(), &recs);
        let out = apply_filters(recs, &filters, &types);
        assert_eq!(out.len(), 3);
    }
}

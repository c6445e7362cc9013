//! Filter options: distinct values offered by the UI's filter dropdowns
//!
//! Options for a field are computed with that field's own filter removed
//! (self-exclusion), so picking "west" still shows "east" with its count.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value as JsonValue;

use pvq_shared::date::epoch_ms;
use pvq_shared::num::{casefold_cmp, to_number};
use pvq_shared::record::{normalize_key_value, resolve_field, Record};
use pvq_shared::value::Value;

use crate::limits::EngineLimits;

use super::{
    record_passes, resolve_field_type, resolve_filter_types, FieldType, FieldTypes, FilterSelection,
    FilterSet, BLANK_SENTINEL,
};

/// Label shown for the blank option.
pub const BLANK_LABEL: &str = "(Blank)";

/// One selectable filter option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    /// The selectable value (the blank sentinel for blanks)
    pub value: JsonValue,
    /// Display label
    pub label: String,
    /// Records carrying this value among those passing the other filters
    pub count: usize,
}

/// Options response for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptionsResult {
    /// The field the options belong to
    pub field: String,
    /// Resolved field type
    pub field_type: FieldType,
    /// Options in natural order for the type
    pub options: Vec<FilterOption>,
    /// Whether the option list was cut at the ceiling
    pub truncated: bool,
    /// Currently selected values that fell outside the kept options
    pub pruned_selected: Vec<String>,
}

/// Collect distinct options for `field`, honoring every filter except its own.
#[must_use]
pub fn collect_options(
    records: &[Record],
    filters: &FilterSet,
    meta: &FieldTypes,
    field: &str,
    limits: &EngineLimits,
) -> FilterOptionsResult {
    let mut others = filters.clone();
    let own_selection = others.shift_remove(field);
    let other_types = resolve_filter_types(&others, meta, records);

    let mut counts: IndexMap<String, (Value, usize)> = IndexMap::new();
    for record in records {
        if !record_passes(record, &others, &other_types) {
            continue;
        }
        let value = resolve_field(record, field).unwrap_or(Value::Null);
        let key = if value.is_blank() {
            BLANK_SENTINEL.to_string()
        } else {
            normalize_key_value(&value)
        };
        let entry = counts.entry(key).or_insert_with(|| (value.clone(), 0));
        entry.1 += 1;
    }

    let field_type = resolve_field_type(field, meta, records);

    let mut entries: Vec<(String, Value, usize)> = counts
        .into_iter()
        .map(|(key, (rep, count))| (key, rep, count))
        .collect();
    sort_entries(&mut entries, field_type);

    let truncated = entries.len() > limits.max_filter_options;
    if truncated {
        entries.truncate(limits.max_filter_options);
    }

    let kept: IndexSet<&str> = entries.iter().map(|(key, _, _)| key.as_str()).collect();
    let pruned_selected = pruned_selection(own_selection.as_ref(), &kept);

    let options = entries
        .into_iter()
        .map(|(key, rep, count)| {
            if key == BLANK_SENTINEL {
                FilterOption {
                    value: JsonValue::String(BLANK_SENTINEL.to_string()),
                    label: BLANK_LABEL.to_string(),
                    count,
                }
            } else {
                FilterOption {
                    label: rep.to_string(),
                    value: rep.to_json(),
                    count,
                }
            }
        })
        .collect();

    FilterOptionsResult {
        field: field.to_string(),
        field_type,
        options,
        truncated,
        pruned_selected,
    }
}

fn sort_entries(entries: &mut [(String, Value, usize)], field_type: FieldType) {
    entries.sort_by(|(key_a, rep_a, _), (key_b, rep_b, _)| {
        // Blanks sort last for every type
        match (key_a == BLANK_SENTINEL, key_b == BLANK_SENTINEL) {
            (true, true) => return std::cmp::Ordering::Equal,
            (true, false) => return std::cmp::Ordering::Greater,
            (false, true) => return std::cmp::Ordering::Less,
            (false, false) => {}
        }
        let natural = match field_type {
            FieldType::Number => partial_by(to_number(rep_a), to_number(rep_b)),
            FieldType::Date => partial_by(epoch_ms(rep_a), epoch_ms(rep_b)),
            FieldType::String => std::cmp::Ordering::Equal,
        };
        natural.then_with(|| casefold_cmp(key_a, key_b))
    });
}

fn partial_by<T: PartialOrd>(a: Option<T>, b: Option<T>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

fn pruned_selection(selection: Option<&FilterSelection>, kept: &IndexSet<&str>) -> Vec<String> {
    let Some(FilterSelection::Values(values)) = selection else {
        return Vec::new();
    };
    values
        .items
        .iter()
        .filter_map(|item| {
            let key = match item.as_str() {
                Some(BLANK_SENTINEL) => BLANK_SENTINEL.to_string(),
                _ => normalize_key_value(item),
            };
            if kept.contains(key.as_str()) {
                None
            } else {
                Some(key)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_filters;
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;
    use serde_json::json;

    fn records() -> Vec<Record> {
        vec![
            record_from([("cls", Value::string("west")), ("year", Value::Int(2025))]),
            record_from([("cls", Value::string("west")), ("year", Value::Int(2026))]),
            record_from([("cls", Value::string("east")), ("year", Value::Int(2026))]),
            record_from([("cls", Value::Null), ("year", Value::Int(2026))]),
        ]
    }

    #[test]
    fn test_counts_and_blank_label() {
        let recs = records();
        let filters = FilterSet::new();
        let result = collect_options(
            &recs,
            &filters,
            &FieldTypes::new(),
            "cls",
            &EngineLimits::default(),
        );
        assert_eq!(result.options.len(), 3);
        // strings sort casefolded, blank last
        assert_eq!(result.options[0].label, "east");
        assert_eq!(result.options[0].count, 1);
        assert_eq!(result.options[1].label, "west");
        assert_eq!(result.options[1].count, 2);
        assert_eq!(result.options[2].label, BLANK_LABEL);
        assert_eq!(result.options[2].value, json!(BLANK_SENTINEL));
        assert!(!result.truncated);
    }

    #[test]
    fn test_self_exclusion() {
        let recs = records();
        let filters = parse_filters(&json!({"cls": ["west"], "year": [2026]})).unwrap();
        let result = collect_options(
            &recs,
            &filters,
            &FieldTypes::new(),
            "cls",
            &EngineLimits::default(),
        );
        // the year filter applies, the cls filter does not
        let labels: Vec<&str> = result.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["east", "west", BLANK_LABEL]);
        assert_eq!(result.options[1].count, 1);
    }

    #[test]
    fn test_numeric_sort_and_truncation() {
        let recs = records();
        let filters = FilterSet::new();
        let limits = EngineLimits {
            max_filter_options: 1,
            ..EngineLimits::default()
        };
        let result = collect_options(&recs, &filters, &FieldTypes::new(), "year", &limits);
        assert!(result.truncated);
        assert_eq!(result.options.len(), 1);
        assert_eq!(result.options[0].label, "2025");
    }

    #[test]
    fn test_pruned_selected() {
        let recs = records();
        let filters = parse_filters(&json!({"year": [2026, 1999]})).unwrap();
        let result = collect_options(
            &recs,
            &filters,
            &FieldTypes::new(),
            "year",
            &EngineLimits::default(),
        );
        assert_eq!(result.pruned_selected, vec!["1999".to_string()]);
    }
}

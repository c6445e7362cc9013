//! Left/inner joins of secondary datasets onto the base records
//!
//! A join resolves its secondary rows (inline or from a named source), filters
//! them, optionally pre-aggregates them per foreign key, builds a lookup table
//! keyed by normalized key value, and merges matches into the base records
//! under an optional result prefix.

pub mod aggregate;
pub mod streaming;

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;

use pvq_shared::date::epoch_ms;
use pvq_shared::num::{to_number, values_equal};
use pvq_shared::record::{normalize_key_value, resolve_field, Record};
use pvq_shared::value::Value;

use crate::diag::{JoinDebug, Warnings};
use crate::error::{Error, Result};
use crate::limits::EngineLimits;

pub use aggregate::{AggregateBuilder, AggregateMetric, AggregateOp, AggregateSpec};
pub use streaming::StreamingJoinBuilder;

/// How many lookup keys the debug payload samples.
const SAMPLE_KEY_LIMIT: usize = 5;

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    /// Keep unmatched base records with no merged fields
    #[default]
    Left,
    /// Drop unmatched base records
    Inner,
}

impl JoinType {
    /// Parse from the configuration spelling.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(JoinType::Left),
            "inner" => Ok(JoinType::Inner),
            other => Err(Error::validation(format!("Unknown join type '{other}'"))),
        }
    }

    /// The canonical spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Left => "left",
            JoinType::Inner => "inner",
        }
    }
}

/// Where the joined rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinData {
    /// Rows inlined in the request
    Rows(Vec<Record>),
    /// Rows loaded by the embedder's record source
    Source(String),
}

/// Comparison operators for join row filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equal (type-lenient)
    Eq,
    /// Not equal
    Neq,
    /// Member of a list
    In,
    /// Not a member of a list
    Nin,
    /// Within an inclusive range
    Between,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Rendered value contains the substring
    Contains,
    /// Rendered value does not contain the substring
    NotContains,
    /// Blank or empty collection
    IsEmpty,
    /// Neither blank nor an empty collection
    NotEmpty,
}

impl FilterOp {
    /// Parse from the configuration spelling.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" | "==" | "=" => Ok(FilterOp::Eq),
            "neq" | "ne" | "!=" => Ok(FilterOp::Neq),
            "in" => Ok(FilterOp::In),
            "nin" | "not_in" => Ok(FilterOp::Nin),
            "between" => Ok(FilterOp::Between),
            "gt" | ">" => Ok(FilterOp::Gt),
            "gte" | ">=" => Ok(FilterOp::Gte),
            "lt" | "<" => Ok(FilterOp::Lt),
            "lte" | "<=" => Ok(FilterOp::Lte),
            "contains" => Ok(FilterOp::Contains),
            "not_contains" => Ok(FilterOp::NotContains),
            "is_empty" | "empty" => Ok(FilterOp::IsEmpty),
            "not_empty" | "nonempty" => Ok(FilterOp::NotEmpty),
            other => Err(Error::validation(format!(
                "Unknown join filter op '{other}'"
            ))),
        }
    }
}

/// One predicate applied to joined rows before lookup/aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinFilter {
    /// Field on the joined row
    pub key: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Comparison operand (unused by the emptiness ops)
    pub value: Value,
}

impl JoinFilter {
    /// Whether a joined row passes this predicate.
    #[must_use]
    pub fn matches(&self, row: &Record) -> bool {
        let actual = resolve_field(row, &self.key).unwrap_or(Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(&actual, &self.value),
            FilterOp::Neq => !values_equal(&actual, &self.value),
            FilterOp::In => list_contains(&self.value, &actual),
            FilterOp::Nin => !list_contains(&self.value, &actual),
            FilterOp::Between => between(&actual, &self.value),
            FilterOp::Gt => cmp_is(&actual, &self.value, |o| o == Ordering::Greater),
            FilterOp::Gte => cmp_is(&actual, &self.value, |o| o != Ordering::Less),
            FilterOp::Lt => cmp_is(&actual, &self.value, |o| o == Ordering::Less),
            FilterOp::Lte => cmp_is(&actual, &self.value, |o| o != Ordering::Greater),
            FilterOp::Contains => rendered_contains(&actual, &self.value),
            FilterOp::NotContains => !rendered_contains(&actual, &self.value),
            FilterOp::IsEmpty => is_empty_value(&actual),
            FilterOp::NotEmpty => !is_empty_value(&actual),
        }
    }
}

/// Coercing comparison: numbers first, then dates, then rendered strings.
/// Nulls never compare.
#[must_use]
pub fn coerced_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (to_number(a), to_number(b)) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (epoch_ms(a), epoch_ms(b)) {
        return Some(x.cmp(&y));
    }
    Some(a.to_string().cmp(&b.to_string()))
}

fn cmp_is(actual: &Value, expected: &Value, check: impl Fn(Ordering) -> bool) -> bool {
    coerced_cmp(actual, expected).is_some_and(check)
}

fn list_contains(list: &Value, actual: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
        other => values_equal(actual, other),
    }
}

fn between(actual: &Value, bounds: &Value) -> bool {
    let (lo, hi) = match bounds {
        Value::Array(items) => (items.first(), items.get(1)),
        Value::Object(map) => (
            map.get("start").or_else(|| map.get("from")),
            map.get("end").or_else(|| map.get("to")),
        ),
        _ => (None, None),
    };
    if let Some(lo) = lo.filter(|v| !v.is_null()) {
        if !cmp_is(actual, lo, |o| o != Ordering::Less) {
            return false;
        }
    }
    if let Some(hi) = hi.filter(|v| !v.is_null()) {
        if !cmp_is(actual, hi, |o| o != Ordering::Greater) {
            return false;
        }
    }
    true
}

fn rendered_contains(actual: &Value, needle: &Value) -> bool {
    if actual.is_null() {
        return false;
    }
    actual
        .to_string()
        .to_lowercase()
        .contains(&needle.to_string().to_lowercase())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        other => other.is_blank(),
    }
}

/// A full join configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Joined rows, inline or by source id
    pub data: JoinData,
    /// Left or inner
    pub join_type: JoinType,
    /// Key field on the base records
    pub local_key: String,
    /// Key field on the joined rows
    pub foreign_key: String,
    /// Prefix for merged fields ("PLAN" yields "PLAN.amount")
    pub result_prefix: Option<String>,
    /// Allow-list of joined fields to merge (raw joins only)
    pub fields: Option<Vec<String>>,
    /// Predicates applied to joined rows first
    pub filters: Vec<JoinFilter>,
    /// Optional per-key pre-aggregation
    pub aggregate: Option<AggregateSpec>,
}

impl JoinSpec {
    /// Parse and validate one join configuration object.
    pub fn from_json(raw: &JsonValue) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::validation("join must be an object"))?;

        let data = if let Some(rows) = obj.get("rows").or_else(|| obj.get("data")) {
            let rows = rows
                .as_array()
                .ok_or_else(|| Error::validation("join rows must be an array"))?;
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                match Value::from_json(row.clone()) {
                    Value::Object(map) => records.push(map),
                    _ => return Err(Error::validation("join rows must be objects")),
                }
            }
            JoinData::Rows(records)
        } else if let Some(source) = obj
            .get("source")
            .or_else(|| obj.get("sourceId"))
            .and_then(JsonValue::as_str)
        {
            JoinData::Source(source.to_string())
        } else {
            return Err(Error::validation(
                "join requires inline rows or a source id",
            ));
        };

        let join_type = match obj
            .get("joinType")
            .or_else(|| obj.get("type"))
            .and_then(JsonValue::as_str)
        {
            Some(s) => JoinType::from_str(s)?,
            None => JoinType::default(),
        };

        let local_key = obj
            .get("localKey")
            .or_else(|| obj.get("local_key"))
            .and_then(JsonValue::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::validation("join requires a localKey"))?
            .to_string();
        let foreign_key = obj
            .get("foreignKey")
            .or_else(|| obj.get("foreign_key"))
            .and_then(JsonValue::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::validation("join requires a foreignKey"))?
            .to_string();

        let result_prefix = obj
            .get("resultPrefix")
            .or_else(|| obj.get("prefix"))
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let fields = obj.get("fields").and_then(JsonValue::as_array).map(|arr| {
            arr.iter()
                .filter_map(JsonValue::as_str)
                .map(String::from)
                .collect::<Vec<_>>()
        });

        let mut filters = Vec::new();
        if let Some(raw_filters) = obj.get("filters").and_then(JsonValue::as_array) {
            for raw_filter in raw_filters {
                let f = raw_filter
                    .as_object()
                    .ok_or_else(|| Error::validation("join filter must be an object"))?;
                let key = f
                    .get("key")
                    .or_else(|| f.get("field"))
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| Error::validation("join filter requires a key"))?
                    .to_string();
                let op = f
                    .get("op")
                    .and_then(JsonValue::as_str)
                    .map(FilterOp::from_str)
                    .transpose()?
                    .unwrap_or(FilterOp::Eq);
                let value = f
                    .get("value")
                    .cloned()
                    .map(Value::from_json)
                    .unwrap_or(Value::Null);
                filters.push(JoinFilter { key, op, value });
            }
        }

        let aggregate = obj
            .get("aggregate")
            .filter(|v| !v.is_null())
            .map(AggregateSpec::from_json)
            .transpose()?;
        if let Some(agg) = &aggregate {
            agg.validate(&foreign_key)?;
        }

        Ok(JoinSpec {
            data,
            join_type,
            local_key,
            foreign_key,
            result_prefix,
            fields,
            filters,
            aggregate,
        })
    }

    /// The prefix merged fields land under, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.result_prefix.as_deref()
    }

    fn merged_key(&self, field: &str) -> String {
        match &self.result_prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        }
    }
}

/// Lookup table from normalized foreign-key value to matching rows.
pub type Lookup = IndexMap<String, Vec<Record>>;

/// The outcome of applying one join.
#[derive(Debug)]
pub struct JoinOutcome {
    /// The merged record set
    pub records: Vec<Record>,
    /// Join diagnostics
    pub debug: JoinDebug,
}

/// Apply one join over fully materialized joined rows. Streaming loads go
/// through [`StreamingJoinBuilder`] instead; this is the same machinery with a
/// single chunk.
pub fn apply_join(
    base: Vec<Record>,
    spec: &JoinSpec,
    joined_rows: &[Record],
    limits: &EngineLimits,
    warnings: &mut Warnings,
) -> Result<JoinOutcome> {
    let mut builder = StreamingJoinBuilder::new(spec, limits);
    builder.push_chunk(joined_rows)?;
    let lookup = builder.finish(warnings);
    Ok(merge_with_lookup(base, spec, &lookup))
}

/// Merge base records against a finished lookup table.
#[must_use]
pub fn merge_with_lookup(base: Vec<Record>, spec: &JoinSpec, lookup: &Lookup) -> JoinOutcome {
    let base_before = base.len();
    let mut matched_rows = 0usize;
    let mut sample_keys: IndexSet<String> = IndexSet::new();
    let mut out = Vec::with_capacity(base.len());

    // fields allow-list applies to raw joins only; aggregated rows already
    // carry exactly the configured metric keys
    let allow = if spec.aggregate.is_some() {
        None
    } else {
        spec.fields.as_deref()
    };

    for record in base {
        let key_value = resolve_field(&record, &spec.local_key).unwrap_or(Value::Null);
        let matches = if key_value.is_blank() {
            None
        } else {
            let key = normalize_key_value(&key_value);
            if sample_keys.len() < SAMPLE_KEY_LIMIT {
                sample_keys.insert(key.clone());
            }
            lookup.get(&key).filter(|rows| !rows.is_empty())
        };

        match matches {
            None => {
                if spec.join_type == JoinType::Left {
                    out.push(record);
                }
            }
            Some(rows) => {
                matched_rows += 1;
                for row in rows {
                    let mut merged = record.clone();
                    for (field, value) in row {
                        if field != &spec.foreign_key
                            && allow.is_some_and(|list| !list.iter().any(|f| f == field))
                        {
                            continue;
                        }
                        merged.insert(spec.merged_key(field), value.clone());
                    }
                    out.push(merged);
                }
            }
        }
    }

    let debug = JoinDebug {
        prefix: spec.result_prefix.clone(),
        base_before,
        base_after: out.len(),
        matched_rows,
        sample_keys: sample_keys.into_iter().collect(),
    };
    JoinOutcome {
        records: out,
        debug,
    }
}

//! Pre-aggregation of the joined side
//!
//! When a join carries an aggregate, the joined rows are folded down to one
//! row per foreign-key group before the merge, so a thousand payment rows
//! become a single `payments_sum` per order.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;

use pvq_shared::num::to_number;
use pvq_shared::record::{normalize_key_value, resolve_field, value_signature, Record};
use pvq_shared::value::Value;

use crate::diag::Warnings;
use crate::error::{Error, Result};

/// Aggregation operators for join pre-aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// Row count per group
    Count,
    /// Distinct non-blank values per group
    CountDistinct,
    /// Numeric sum
    Sum,
    /// Numeric average
    Avg,
    /// The single value shared by the group; null when the group disagrees
    Value,
}

impl AggregateOp {
    /// Parse from the configuration spelling.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(AggregateOp::Count),
            "count_distinct" | "distinct" => Ok(AggregateOp::CountDistinct),
            "sum" => Ok(AggregateOp::Sum),
            "avg" | "average" => Ok(AggregateOp::Avg),
            "value" => Ok(AggregateOp::Value),
            other => Err(Error::validation(format!(
                "Unknown aggregate op '{other}'"
            ))),
        }
    }

    /// The canonical spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::CountDistinct => "count_distinct",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Value => "value",
        }
    }
}

/// One aggregate output.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMetric {
    /// Output key on the aggregated row
    pub key: String,
    /// Field read from each joined row (optional for `count`)
    pub source_key: Option<String>,
    /// The operator
    pub op: AggregateOp,
}

/// Aggregate configuration for a join.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    /// Grouping fields; must be exactly the join's foreign key
    pub group_by: Vec<String>,
    /// Metric outputs
    pub metrics: Vec<AggregateMetric>,
}

impl AggregateSpec {
    /// Parse from raw JSON configuration.
    pub fn from_json(raw: &JsonValue) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::validation("join aggregate must be an object"))?;
        let group_by = obj
            .get("groupBy")
            .or_else(|| obj.get("group_by"))
            .and_then(JsonValue::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(JsonValue::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let raw_metrics = obj
            .get("metrics")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::validation("join aggregate requires a metrics array"))?;

        let mut metrics = Vec::with_capacity(raw_metrics.len());
        for raw_metric in raw_metrics {
            let metric = raw_metric
                .as_object()
                .ok_or_else(|| Error::validation("aggregate metric must be an object"))?;
            let op = metric
                .get("op")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| Error::validation("aggregate metric requires an op"))?;
            let op = AggregateOp::from_str(op)?;
            let source_key = metric
                .get("sourceKey")
                .or_else(|| metric.get("source"))
                .and_then(JsonValue::as_str)
                .map(String::from);
            if source_key.is_none() && op != AggregateOp::Count {
                return Err(Error::validation(format!(
                    "aggregate op '{}' requires a sourceKey",
                    op.as_str()
                )));
            }
            let key = metric
                .get("key")
                .and_then(JsonValue::as_str)
                .map(String::from)
                .or_else(|| {
                    source_key
                        .as_ref()
                        .map(|s| format!("{}__{}", s, op.as_str()))
                })
                .unwrap_or_else(|| op.as_str().to_string());
            metrics.push(AggregateMetric {
                key,
                source_key,
                op,
            });
        }

        Ok(AggregateSpec { group_by, metrics })
    }

    /// Validate against the join's foreign key. Bad configuration aborts the
    /// request before any data is touched.
    pub fn validate(&self, foreign_key: &str) -> Result<()> {
        if self.group_by.len() != 1 || self.group_by[0] != foreign_key {
            return Err(Error::validation(format!(
                "join aggregate must group by the foreign key '{foreign_key}'"
            )));
        }
        let mut seen = IndexSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.key.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate aggregate metric key '{}'",
                    metric.key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MetricState {
    count: usize,
    sum: f64,
    numeric_count: usize,
    distinct: IndexSet<String>,
    first: Option<Value>,
    first_sig: Option<String>,
    ambiguous: bool,
}

/// Incremental aggregation over joined rows, chunk by chunk.
#[derive(Debug)]
pub struct AggregateBuilder<'a> {
    spec: &'a AggregateSpec,
    foreign_key: &'a str,
    groups: IndexMap<String, (Value, Vec<MetricState>)>,
    observed: Vec<bool>,
}

impl<'a> AggregateBuilder<'a> {
    /// Create a builder for a validated spec.
    #[must_use]
    pub fn new(spec: &'a AggregateSpec, foreign_key: &'a str) -> Self {
        AggregateBuilder {
            spec,
            foreign_key,
            groups: IndexMap::new(),
            observed: vec![false; spec.metrics.len()],
        }
    }

    /// Number of groups accumulated so far.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Fold one joined row into its group. Rows with a blank foreign key are
    /// skipped.
    pub fn push(&mut self, row: &Record) {
        let key_value = resolve_field(row, self.foreign_key).unwrap_or(Value::Null);
        if key_value.is_blank() {
            return;
        }
        let key = normalize_key_value(&key_value);
        let metric_count = self.spec.metrics.len();
        let (_, states) = self.groups.entry(key).or_insert_with(|| {
            (
                key_value.clone(),
                (0..metric_count).map(|_| MetricState::default()).collect(),
            )
        });

        for (i, metric) in self.spec.metrics.iter().enumerate() {
            let state = &mut states[i];
            state.count += 1;
            let Some(source) = metric.source_key.as_deref() else {
                continue;
            };
            let Some(value) = resolve_field(row, source) else {
                continue;
            };
            self.observed[i] = true;
            match metric.op {
                AggregateOp::Count => {}
                AggregateOp::Sum | AggregateOp::Avg => {
                    if let Some(n) = to_number(&value) {
                        state.sum += n;
                        state.numeric_count += 1;
                    }
                }
                AggregateOp::CountDistinct => {
                    if !value.is_blank() {
                        state.distinct.insert(value_signature(&value));
                    }
                }
                AggregateOp::Value => {
                    if value.is_blank() {
                        continue;
                    }
                    let sig = value_signature(&value);
                    match &state.first_sig {
                        None => {
                            state.first = Some(value);
                            state.first_sig = Some(sig);
                        }
                        Some(existing) if *existing != sig => state.ambiguous = true,
                        Some(_) => {}
                    }
                }
            }
        }
    }

    /// Finalize into one record per group, keyed by the normalized foreign
    /// key.
    #[must_use]
    pub fn finish(self, warnings: &mut Warnings) -> IndexMap<String, Record> {
        let mut ambiguous_metrics: IndexSet<&str> = IndexSet::new();

        let mut out = IndexMap::with_capacity(self.groups.len());
        for (key, (rep, states)) in &self.groups {
            let mut record = Record::new();
            record.insert(self.foreign_key.to_string(), rep.clone());
            for (metric, state) in self.spec.metrics.iter().zip(states) {
                let value = match metric.op {
                    AggregateOp::Count => Value::Int(state.count as i64),
                    AggregateOp::CountDistinct => Value::Int(state.distinct.len() as i64),
                    AggregateOp::Sum => {
                        if state.numeric_count > 0 {
                            Value::Float(state.sum)
                        } else {
                            Value::Null
                        }
                    }
                    AggregateOp::Avg => {
                        if state.numeric_count > 0 {
                            Value::Float(state.sum / state.numeric_count as f64)
                        } else {
                            Value::Null
                        }
                    }
                    AggregateOp::Value => {
                        if state.ambiguous {
                            ambiguous_metrics.insert(metric.key.as_str());
                            Value::Null
                        } else {
                            state.first.clone().unwrap_or(Value::Null)
                        }
                    }
                };
                record.insert(metric.key.clone(), value);
            }
            out.insert(key.clone(), record);
        }

        for key in ambiguous_metrics {
            warnings.push(format!(
                "Join aggregate metric '{key}': conflicting values within a group, emitting null"
            ));
        }
        for (i, metric) in self.spec.metrics.iter().enumerate() {
            if let Some(source) = metric.source_key.as_deref() {
                if !self.observed[i] && !self.groups.is_empty() {
                    warnings.push(format!(
                        "Join aggregate metric '{}': source field '{source}' never observed in joined rows",
                        metric.key
                    ));
                }
            }
        }

        out
    }
}

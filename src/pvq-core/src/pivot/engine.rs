//! Accumulation buckets, the pivot builder, and view finalization
//!
//! Every record feeds the cell bucket for its (row, column) pair, every
//! hierarchy-prefix bucket on both axes, and the grand total, so subtotals
//! and totals come out of the same pass. Finalization turns buckets into a
//! serializable view.

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value as JsonValue;

use pvq_expr::eval::{evaluate, MetricScope};
use pvq_shared::num::{casefold_cmp, to_number};
use pvq_shared::record::{normalize_key_value, resolve_field, value_signature, Record};
use pvq_shared::value::Value;

use crate::diag::Warnings;
use crate::error::{Error, Result};
use crate::limits::EngineLimits;

use super::{
    MetricOp, PivotSpec, SortDirection, SortSpec, ALL_KEY, ALL_LABEL, BLANK_DIM_LABEL,
};

/// Incremental aggregation state for one scope and one base metric.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Bucket {
    count: usize,
    numeric_count: usize,
    sum: f64,
    last: Option<Value>,
    distinct: Option<IndexSet<String>>,
}

impl Bucket {
    fn new(track_distinct: bool) -> Self {
        Bucket {
            count: 0,
            numeric_count: 0,
            sum: 0.0,
            last: None,
            distinct: track_distinct.then(IndexSet::new),
        }
    }

    fn update(&mut self, value: &Value) {
        self.count += 1;
        if let Some(n) = to_number(value) {
            self.sum += n;
            self.numeric_count += 1;
        }
        // distinct tracking skips blanks; last takes every value, so a group
        // ending in null finalizes value to null
        if !value.is_blank() {
            if let Some(set) = &mut self.distinct {
                set.insert(value_signature(value));
            }
        }
        self.last = Some(value.clone());
    }

    fn finalize(&self, op: MetricOp) -> Value {
        match op {
            MetricOp::Count => Value::Int(self.count as i64),
            MetricOp::CountDistinct => {
                Value::Int(self.distinct.as_ref().map_or(0, IndexSet::len) as i64)
            }
            MetricOp::Sum => {
                if self.numeric_count > 0 {
                    Value::Float(self.sum)
                } else {
                    Value::Null
                }
            }
            MetricOp::Avg => {
                if self.numeric_count > 0 {
                    Value::Float(self.sum / self.numeric_count as f64)
                } else {
                    Value::Null
                }
            }
            MetricOp::Value => self.last.clone().unwrap_or(Value::Null),
        }
    }
}

/// One output column: a column base × one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotColumn {
    /// Column identity, `"{base}::{metric}"`
    pub key: String,
    /// Display label
    pub label: String,
    /// The column base (dimension tuple) key
    pub base_key: String,
    /// The metric key
    pub metric_key: String,
    /// Conditional-formatting rules targeting this metric
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formatting: Vec<JsonValue>,
}

/// One output row: a node of the row hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    /// Row identity, `"field:normalized|…"` or the all-records key
    pub key: String,
    /// Display label (the deepest dimension value)
    pub label: String,
    /// Hierarchy depth, 1 for the outermost level
    pub depth: usize,
    /// Finalized metric values over the row's whole scope
    pub values: IndexMap<String, Value>,
}

/// The finalized pivot result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotView {
    /// Flattened column list
    pub columns: Vec<PivotColumn>,
    /// Flattened row hierarchy, subtotal rows before their children
    pub rows: Vec<PivotRow>,
    /// Cell values keyed `"{row}||{base}||{metric}"`
    pub cells: IndexMap<String, Value>,
    /// Grand totals per metric
    pub totals: IndexMap<String, Value>,
    /// Deduplicated soft-failure warnings
    pub warnings: Vec<String>,
}

/// Accumulates records and finalizes into a [`PivotView`]. This is the shared
/// core of the batch and streaming paths.
#[derive(Debug)]
pub struct PivotBuilder<'a> {
    spec: &'a PivotSpec,
    limits: &'a EngineLimits,
    // prefix key → normalized value tuple, first-seen order
    row_nodes: IndexMap<String, Vec<String>>,
    col_nodes: IndexMap<String, Vec<String>>,
    buckets: IndexMap<(String, String), Vec<Bucket>>,
    dim_values: IndexMap<String, IndexSet<String>>,
    leaf_groups: usize,
}

fn dim_key(fields: &[String], norms: &[String]) -> String {
    if fields.is_empty() {
        return ALL_KEY.to_string();
    }
    fields
        .iter()
        .zip(norms)
        .map(|(field, norm)| format!("{field}:{norm}"))
        .join("|")
}

/// Keys for every depth prefix, the all-records key first.
fn prefix_keys(fields: &[String], norms: &[String]) -> Vec<String> {
    let mut keys = vec![ALL_KEY.to_string()];
    for depth in 1..=fields.len() {
        keys.push(dim_key(&fields[..depth], &norms[..depth]));
    }
    keys
}

fn dim_label(norm: &str) -> String {
    if norm.trim().is_empty() {
        BLANK_DIM_LABEL.to_string()
    } else {
        norm.to_string()
    }
}

impl<'a> PivotBuilder<'a> {
    /// Create a builder for one pivot request.
    #[must_use]
    pub fn new(spec: &'a PivotSpec, limits: &'a EngineLimits) -> Self {
        PivotBuilder {
            spec,
            limits,
            row_nodes: IndexMap::new(),
            col_nodes: IndexMap::new(),
            buckets: IndexMap::new(),
            dim_values: IndexMap::new(),
            leaf_groups: 0,
        }
    }

    fn dim_norms(&mut self, fields: &[String], record: &Record) -> Result<Vec<String>> {
        let mut norms = Vec::with_capacity(fields.len());
        for field in fields {
            let value = resolve_field(record, field).unwrap_or(Value::Null);
            let norm = normalize_key_value(&value);
            let seen = self.dim_values.entry(field.clone()).or_default();
            if !seen.contains(&norm) {
                if seen.len() >= self.limits.max_unique_values_per_dim {
                    return Err(Error::limit(
                        "distinct values per dimension",
                        self.limits.max_unique_values_per_dim,
                        seen.len() + 1,
                    ));
                }
                seen.insert(norm.clone());
            }
            norms.push(norm);
        }
        Ok(norms)
    }

    /// Fold one record into every scope it belongs to.
    pub fn push(&mut self, record: &Record) -> Result<()> {
        let spec = self.spec;
        let row_norms = self.dim_norms(&spec.rows, record)?;
        let col_norms = self.dim_norms(&spec.columns, record)?;
        let row_keys = prefix_keys(&spec.rows, &row_norms);
        let col_keys = prefix_keys(&spec.columns, &col_norms);

        let full_pair = (
            row_keys[row_keys.len() - 1].clone(),
            col_keys[col_keys.len() - 1].clone(),
        );
        if !self.buckets.contains_key(&full_pair) {
            if self.leaf_groups >= self.limits.max_groups {
                return Err(Error::limit(
                    "pivot groups",
                    self.limits.max_groups,
                    self.leaf_groups + 1,
                ));
            }
            self.leaf_groups += 1;
        }

        for depth in 1..row_keys.len() {
            self.row_nodes
                .entry(row_keys[depth].clone())
                .or_insert_with(|| row_norms[..depth].to_vec());
        }
        for depth in 1..col_keys.len() {
            self.col_nodes
                .entry(col_keys[depth].clone())
                .or_insert_with(|| col_norms[..depth].to_vec());
        }

        let inputs: Vec<Value> = spec
            .base_metrics()
            .map(|(_, source, _)| resolve_field(record, source).unwrap_or(Value::Null))
            .collect();
        let track_distinct = spec.needs_distinct();

        for row_key in &row_keys {
            for col_key in &col_keys {
                let buckets = self
                    .buckets
                    .entry((row_key.clone(), col_key.clone()))
                    .or_insert_with(|| {
                        (0..inputs.len()).map(|_| Bucket::new(track_distinct)).collect()
                    });
                for (bucket, value) in buckets.iter_mut().zip(&inputs) {
                    bucket.update(value);
                }
            }
        }
        Ok(())
    }

    /// Finalized metric values (base then formulas) at one (row, column)
    /// scope. A scope never fed yields empty-bucket values.
    fn scope_values(
        &self,
        row_key: &str,
        col_key: &str,
        warnings: &mut Warnings,
    ) -> IndexMap<String, Value> {
        let empty: Vec<Bucket> = Vec::new();
        let buckets = self
            .buckets
            .get(&(row_key.to_string(), col_key.to_string()))
            .unwrap_or(&empty);
        let fallback = Bucket::new(false);

        let mut values = IndexMap::new();
        for (i, (metric, _, op)) in self.spec.base_metrics().enumerate() {
            let bucket = buckets.get(i).unwrap_or(&fallback);
            values.insert(metric.key.clone(), bucket.finalize(op));
        }
        for (metric, compiled) in self.spec.formula_metrics() {
            let result = match compiled {
                Ok(expr) => match evaluate(expr, &MetricScope::new(&values)) {
                    Ok(v) => v,
                    Err(e) => {
                        warnings.push(format!("Formula metric '{}': {e}", metric.key));
                        Value::Null
                    }
                },
                Err(e) => {
                    warnings.push(format!(
                        "Formula metric '{}' failed to compile: {e}",
                        metric.key
                    ));
                    Value::Null
                }
            };
            values.insert(metric.key.clone(), result);
        }
        values
    }

    fn ordered_row_keys(
        &self,
        row_values: &IndexMap<String, IndexMap<String, Value>>,
    ) -> Vec<String> {
        let spec = self.spec;
        let mut children: IndexMap<String, Vec<String>> = IndexMap::new();
        for (key, norms) in &self.row_nodes {
            let parent = if norms.len() == 1 {
                ALL_KEY.to_string()
            } else {
                dim_key(&spec.rows[..norms.len() - 1], &norms[..norms.len() - 1])
            };
            children.entry(parent).or_default().push(key.clone());
        }

        for (_, siblings) in children.iter_mut() {
            let level = self.row_nodes[&siblings[0]].len() - 1;
            let Some(directive) = spec.sort.get(&level) else {
                continue;
            };
            match directive {
                SortSpec::ByValue(direction) => {
                    let direction = *direction;
                    siblings.sort_by(|a, b| {
                        let ord = casefold_cmp(
                            self.row_nodes[a].last().map_or("", String::as_str),
                            self.row_nodes[b].last().map_or("", String::as_str),
                        );
                        apply_direction(ord, direction)
                    });
                }
                SortSpec::ByMetric { metric, direction } => {
                    let direction = *direction;
                    siblings.sort_by(|a, b| {
                        let num = |key: &String| {
                            row_values
                                .get(key)
                                .and_then(|values| values.get(metric.as_str()))
                                .and_then(to_number)
                        };
                        apply_direction(nulls_last_cmp(num(a), num(b)), direction)
                    });
                }
            }
        }

        let mut ordered = Vec::with_capacity(self.row_nodes.len());
        flatten(ALL_KEY, &children, &mut ordered);
        ordered
    }

    /// Finalize into the output view.
    #[must_use]
    pub fn finish(self) -> PivotView {
        let mut warnings = Warnings::new();
        let spec = self.spec;

        let col_depth = spec.columns.len();
        let bases: Vec<(String, String)> = if col_depth == 0 {
            vec![(ALL_KEY.to_string(), ALL_LABEL.to_string())]
        } else {
            self.col_nodes
                .iter()
                .filter(|(_, norms)| norms.len() == col_depth)
                .map(|(key, norms)| {
                    let label = norms.iter().map(|n| dim_label(n)).join(" / ");
                    (key.clone(), label)
                })
                .collect()
        };

        let mut columns = Vec::with_capacity(bases.len() * spec.metrics.len());
        for (base_key, base_label) in &bases {
            for metric in &spec.metrics {
                let label = if base_key == ALL_KEY && col_depth == 0 {
                    metric.label().to_string()
                } else {
                    format!("{base_label} - {}", metric.label())
                };
                let formatting = spec
                    .formatting
                    .iter()
                    .filter(|rule| rule.metric == metric.key)
                    .map(|rule| rule.rule.clone())
                    .collect();
                columns.push(PivotColumn {
                    key: format!("{base_key}::{}", metric.key),
                    label,
                    base_key: base_key.clone(),
                    metric_key: metric.key.clone(),
                    formatting,
                });
            }
        }

        let totals = self.scope_values(ALL_KEY, ALL_KEY, &mut warnings);

        // row scope values feed both output and metric-based sorting
        let mut row_values: IndexMap<String, IndexMap<String, Value>> = IndexMap::new();
        for key in self.row_nodes.keys() {
            let values = self.scope_values(key, ALL_KEY, &mut warnings);
            row_values.insert(key.clone(), values);
        }

        let ordered = self.ordered_row_keys(&row_values);
        let mut rows = Vec::with_capacity(ordered.len().max(1));
        if spec.rows.is_empty() {
            rows.push(PivotRow {
                key: ALL_KEY.to_string(),
                label: ALL_LABEL.to_string(),
                depth: 0,
                values: totals.clone(),
            });
        } else {
            for key in &ordered {
                let norms = &self.row_nodes[key];
                rows.push(PivotRow {
                    key: key.clone(),
                    label: dim_label(norms.last().map_or("", String::as_str)),
                    depth: norms.len(),
                    values: row_values.shift_remove(key).unwrap_or_default(),
                });
            }
        }

        let mut cells = IndexMap::new();
        for row in &rows {
            for (base_key, _) in &bases {
                let present = base_key == ALL_KEY
                    || self
                        .buckets
                        .contains_key(&(row.key.clone(), base_key.clone()));
                if !present {
                    continue;
                }
                let values = if base_key == ALL_KEY {
                    row.values.clone()
                } else {
                    self.scope_values(&row.key, base_key, &mut warnings)
                };
                for (metric_key, value) in values {
                    cells.insert(format!("{}||{base_key}||{metric_key}", row.key), value);
                }
            }
        }

        PivotView {
            columns,
            rows,
            cells,
            totals,
            warnings: warnings.into_vec(),
        }
    }
}

fn apply_direction(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

/// Ascending with nulls last; reversing yields descending with nulls first.
fn nulls_last_cmp(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn flatten(key: &str, children: &IndexMap<String, Vec<String>>, out: &mut Vec<String>) {
    if let Some(kids) = children.get(key) {
        for kid in kids {
            out.push(kid.clone());
            flatten(kid, children, out);
        }
    }
}

/// Batch entry point: one pass over fully materialized records.
pub fn pivot(records: &[Record], spec: &PivotSpec, limits: &EngineLimits) -> Result<PivotView> {
    let mut builder = PivotBuilder::new(spec, limits);
    for record in records {
        builder.push(record)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;
    use serde_json::json;

    fn sales() -> Vec<Record> {
        vec![
            record_from([
                ("cls", Value::string("A")),
                ("year", Value::Int(2024)),
                ("value", Value::Int(10)),
            ]),
            record_from([
                ("cls", Value::string("A")),
                ("year", Value::Int(2024)),
                ("value", Value::Int(20)),
            ]),
            record_from([
                ("cls", Value::string("B")),
                ("year", Value::Int(2024)),
                ("value", Value::Int(5)),
            ]),
            record_from([
                ("cls", Value::string("B")),
                ("year", Value::Int(2023)),
                ("value", Value::Int(15)),
            ]),
        ]
    }

    fn sum_spec() -> PivotSpec {
        PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "columns": ["year"],
            "metrics": [{"key": "total", "sourceKey": "value", "op": "sum"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_sum_by_class_and_year() {
        let view = pivot(&sales(), &sum_spec(), &EngineLimits::default()).unwrap();

        assert_eq!(view.totals.get("total"), Some(&Value::Float(50.0)));
        assert_eq!(
            view.cells.get("cls:A||year:2024||total"),
            Some(&Value::Float(30.0))
        );
        assert_eq!(
            view.cells.get("cls:B||year:2024||total"),
            Some(&Value::Float(5.0))
        );
        assert_eq!(
            view.cells.get("cls:B||year:2023||total"),
            Some(&Value::Float(15.0))
        );
        // A never saw 2023: no cell at all
        assert_eq!(view.cells.get("cls:A||year:2023||total"), None);

        // first-seen dimension order
        let row_keys: Vec<&str> = view.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(row_keys, vec!["cls:A", "cls:B"]);
        let col_keys: Vec<&str> = view.columns.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(col_keys, vec!["year:2024::total", "year:2023::total"]);
        assert_eq!(view.columns[0].label, "2024 - total");

        // row totals across all columns
        assert_eq!(view.rows[0].values.get("total"), Some(&Value::Float(30.0)));
        assert_eq!(view.rows[1].values.get("total"), Some(&Value::Float(20.0)));
        assert!(view.warnings.is_empty());
    }

    #[test]
    fn test_no_dimensions_yields_single_scope() {
        let spec = PivotSpec::from_json(&json!({
            "metrics": [{"key": "n", "sourceKey": "value", "op": "count"}]
        }))
        .unwrap();
        let view = pivot(&sales(), &spec, &EngineLimits::default()).unwrap();
        assert_eq!(view.totals.get("n"), Some(&Value::Int(4)));
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].label, ALL_LABEL);
        assert_eq!(view.cells.get("__all__||__all__||n"), Some(&Value::Int(4)));
        assert_eq!(view.columns.len(), 1);
        assert_eq!(view.columns[0].label, "n");
    }

    #[test]
    fn test_value_count_distinct_and_avg() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["grp"],
            "metrics": [
                {"key": "kinds", "sourceKey": "kind", "op": "count_distinct"},
                {"key": "mean", "sourceKey": "amount", "op": "avg"},
                {"key": "latest", "sourceKey": "kind", "op": "value"}
            ]
        }))
        .unwrap();
        let records = vec![
            record_from([
                ("grp", Value::string("A")),
                ("kind", Value::string("x")),
                ("amount", Value::Int(10)),
            ]),
            record_from([
                ("grp", Value::string("A")),
                ("kind", Value::string("y")),
                ("amount", Value::string("not numeric")),
            ]),
            record_from([
                ("grp", Value::string("A")),
                ("kind", Value::string("x")),
                ("amount", Value::Int(20)),
            ]),
            record_from([("grp", Value::string("A")), ("kind", Value::Null)]),
        ];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        let row = &view.rows[0];
        assert_eq!(row.values.get("kinds"), Some(&Value::Int(2)));
        assert_eq!(row.values.get("mean"), Some(&Value::Float(15.0)));
        // the trailing null is the last value, and it wins
        assert_eq!(row.values.get("latest"), Some(&Value::Null));
    }

    #[test]
    fn test_value_takes_last_even_when_blank() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["grp"],
            "metrics": [{"key": "latest", "sourceKey": "v", "op": "value"}]
        }))
        .unwrap();
        let records = vec![
            record_from([("grp", Value::string("A")), ("v", Value::string("x"))]),
            record_from([("grp", Value::string("A")), ("v", Value::Null)]),
            record_from([("grp", Value::string("B")), ("v", Value::string("y"))]),
        ];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        assert_eq!(view.rows[0].values.get("latest"), Some(&Value::Null));
        assert_eq!(view.rows[1].values.get("latest"), Some(&Value::string("y")));
    }

    #[test]
    fn test_sum_of_no_numerics_is_null() {
        let spec = PivotSpec::from_json(&json!({
            "metrics": [{"key": "total", "sourceKey": "value", "op": "sum"}]
        }))
        .unwrap();
        let records = vec![record_from([("value", Value::string("abc"))])];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        assert_eq!(view.totals.get("total"), Some(&Value::Null));
    }

    #[test]
    fn test_formula_metrics() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "metrics": [
                {"key": "total", "sourceKey": "value", "op": "sum"},
                {"key": "n", "sourceKey": "value", "op": "count"},
                {"key": "mean", "formula": "total / n"}
            ]
        }))
        .unwrap();
        let view = pivot(&sales(), &spec, &EngineLimits::default()).unwrap();
        assert_eq!(
            view.rows[0].values.get("mean"),
            Some(&Value::Float(15.0))
        );
        assert_eq!(view.totals.get("mean"), Some(&Value::Float(12.5)));
        assert!(view.warnings.is_empty());
    }

    #[test]
    fn test_formula_division_by_zero_warns_once() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "metrics": [
                {"key": "total", "sourceKey": "value", "op": "sum"},
                {"key": "broken", "formula": "total / 0"}
            ]
        }))
        .unwrap();
        let view = pivot(&sales(), &spec, &EngineLimits::default()).unwrap();
        assert_eq!(view.totals.get("broken"), Some(&Value::Null));
        for row in &view.rows {
            assert_eq!(row.values.get("broken"), Some(&Value::Null));
        }
        // one deduplicated warning across every scope
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn test_subtotal_rows_precede_children() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["region", "cls"],
            "metrics": [{"key": "total", "sourceKey": "value", "op": "sum"}]
        }))
        .unwrap();
        let records = vec![
            record_from([
                ("region", Value::string("west")),
                ("cls", Value::string("A")),
                ("value", Value::Int(1)),
            ]),
            record_from([
                ("region", Value::string("west")),
                ("cls", Value::string("B")),
                ("value", Value::Int(2)),
            ]),
            record_from([
                ("region", Value::string("east")),
                ("cls", Value::string("A")),
                ("value", Value::Int(4)),
            ]),
        ];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        let keys: Vec<&str> = view.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "region:west",
                "region:west|cls:A",
                "region:west|cls:B",
                "region:east",
                "region:east|cls:A"
            ]
        );
        assert_eq!(view.rows[0].depth, 1);
        assert_eq!(view.rows[1].depth, 2);
        // subtotal carries the aggregated value
        assert_eq!(view.rows[0].values.get("total"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_sort_by_metric_desc_nulls_first() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "metrics": [{"key": "total", "sourceKey": "value", "op": "sum"}],
            "sort": {"0": {"byMetric": "total", "dir": "desc"}}
        }))
        .unwrap();
        let records = vec![
            record_from([("cls", Value::string("low")), ("value", Value::Int(1))]),
            record_from([("cls", Value::string("none")), ("value", Value::string("x"))]),
            record_from([("cls", Value::string("high")), ("value", Value::Int(9))]),
        ];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        let keys: Vec<&str> = view.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["cls:none", "cls:high", "cls:low"]);
    }

    #[test]
    fn test_sort_by_value_case_insensitive() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "metrics": [{"key": "n", "sourceKey": "cls", "op": "count"}],
            "sort": {"0": {"dir": "asc"}}
        }))
        .unwrap();
        let records = vec![
            record_from([("cls", Value::string("banana"))]),
            record_from([("cls", Value::string("Apple"))]),
            record_from([("cls", Value::string("cherry"))]),
        ];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        let labels: Vec<&str> = view.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn test_blank_dimension_label() {
        let spec = PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "metrics": [{"key": "n", "sourceKey": "cls", "op": "count"}]
        }))
        .unwrap();
        let records = vec![record_from([("other", Value::Int(1))])];
        let view = pivot(&records, &spec, &EngineLimits::default()).unwrap();
        assert_eq!(view.rows[0].label, BLANK_DIM_LABEL);
        assert_eq!(view.rows[0].key, "cls:");
    }

    #[test]
    fn test_group_limit() {
        let spec = sum_spec();
        let limits = EngineLimits {
            max_groups: 2,
            ..EngineLimits::default()
        };
        let err = pivot(&sales(), &spec, &limits).unwrap_err();
        assert!(err.is_resource_limit());
    }

    #[test]
    fn test_unique_value_limit() {
        let spec = sum_spec();
        let limits = EngineLimits {
            max_unique_values_per_dim: 1,
            ..EngineLimits::default()
        };
        let err = pivot(&sales(), &spec, &limits).unwrap_err();
        assert!(err.is_resource_limit());
    }

    #[test]
    fn test_formatting_attaches_to_matching_columns() {
        let spec = PivotSpec::from_json(&json!({
            "columns": ["year"],
            "metrics": [
                {"key": "total", "sourceKey": "value", "op": "sum"},
                {"key": "n", "sourceKey": "value", "op": "count"}
            ],
            "formatting": [{"metric": "total", "op": "gt", "value": 20, "style": {"bold": true}}]
        }))
        .unwrap();
        let view = pivot(&sales(), &spec, &EngineLimits::default()).unwrap();
        for column in &view.columns {
            if column.metric_key == "total" {
                assert_eq!(column.formatting.len(), 1);
            } else {
                assert!(column.formatting.is_empty());
            }
        }
    }
}

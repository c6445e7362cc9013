//! Pivot/aggregation engine
//!
//! Groups records into a row/column dimension hierarchy and computes per-cell,
//! per-prefix, and grand-total aggregates plus formula metrics. The batch
//! entry point and the streaming builder share one accumulation core, so both
//! produce identical views for the same records.

pub mod engine;
pub mod streaming;

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use pvq_expr::ast::Expr;
use pvq_expr::error::ParseError;
use pvq_expr::parse_formula;

use crate::error::{Error, Result};
use crate::filter::FilterSet;

pub use engine::{pivot, PivotColumn, PivotRow, PivotView};
pub use streaming::StreamingPivotBuilder;

/// Dimension key used when an axis has no grouping fields, and for the
/// grand-total scope on both axes.
pub const ALL_KEY: &str = "__all__";

/// Label for the all-records scope.
pub const ALL_LABEL: &str = "All records";

/// Label rendered for a blank dimension value.
pub const BLANK_DIM_LABEL: &str = "\u{2014}";

/// Aggregation operators for base metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOp {
    /// Row count
    Count,
    /// Distinct non-blank values
    CountDistinct,
    /// Numeric sum
    Sum,
    /// Numeric average
    Avg,
    /// Last value seen, nulls included
    Value,
}

impl MetricOp {
    /// Parse from the configuration spelling.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(MetricOp::Count),
            "count_distinct" | "distinct" => Ok(MetricOp::CountDistinct),
            "sum" => Ok(MetricOp::Sum),
            "avg" | "average" => Ok(MetricOp::Avg),
            "value" => Ok(MetricOp::Value),
            other => Err(Error::validation(format!("Unknown metric op '{other}'"))),
        }
    }

    /// The canonical spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricOp::Count => "count",
            MetricOp::CountDistinct => "count_distinct",
            MetricOp::Sum => "sum",
            MetricOp::Avg => "avg",
            MetricOp::Value => "value",
        }
    }
}

/// What a metric computes.
#[derive(Debug, Clone)]
pub enum MetricKind {
    /// Aggregate a source field
    Base {
        /// Field read from each record
        source_key: String,
        /// The operator
        op: MetricOp,
    },
    /// Expression over sibling metric keys, evaluated after base metrics
    Formula {
        /// Expression source, kept for diagnostics
        source: String,
        /// Compile result; a failed compile yields null cells plus one warning
        compiled: std::result::Result<Expr, ParseError>,
    },
}

/// One metric of the pivot.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    /// Unique output key
    pub key: String,
    /// Optional display label
    pub label: Option<String>,
    /// Base or formula
    pub kind: MetricKind,
}

impl MetricSpec {
    /// Display label, falling back to the key.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

/// Direction of a sort directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending (nulls last)
    #[default]
    Asc,
    /// Descending (nulls first)
    Desc,
}

impl SortDirection {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(Error::validation(format!(
                "Unknown sort direction '{other}'"
            ))),
        }
    }
}

/// Ordering of one row hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortSpec {
    /// Case-insensitive ordering of the dimension value
    ByValue(SortDirection),
    /// Numeric ordering of a metric's grand-column value at that row
    ByMetric {
        /// The metric key ordered by
        metric: String,
        /// Direction
        direction: SortDirection,
    },
}

/// Conditional-formatting rule, attached verbatim to matching output columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRule {
    /// The metric key the rule targets
    pub metric: String,
    /// The rule payload, passed through untouched
    pub rule: JsonValue,
}

/// A full pivot configuration.
#[derive(Debug, Clone, Default)]
pub struct PivotSpec {
    /// Row grouping fields, outermost first
    pub rows: Vec<String>,
    /// Column grouping fields, outermost first
    pub columns: Vec<String>,
    /// Metrics in output order
    pub metrics: Vec<MetricSpec>,
    /// Default filter selections layered under the request's
    pub default_filters: FilterSet,
    /// Per-row-level sort directives (level 0 is the outermost)
    pub sort: BTreeMap<usize, SortSpec>,
    /// Conditional-formatting rules
    pub formatting: Vec<FormatRule>,
}

impl PivotSpec {
    /// Parse and validate one pivot configuration object.
    pub fn from_json(raw: &JsonValue) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::validation("pivot spec must be an object"))?;

        let rows = string_list(obj.get("rows"))?;
        let columns = string_list(obj.get("columns").or_else(|| obj.get("cols")))?;

        let raw_metrics = obj
            .get("metrics")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::validation("pivot spec requires a metrics array"))?;
        if raw_metrics.is_empty() {
            return Err(Error::validation("pivot spec requires at least one metric"));
        }

        let mut metrics = Vec::with_capacity(raw_metrics.len());
        for raw_metric in raw_metrics {
            metrics.push(parse_metric(raw_metric)?);
        }
        let mut seen = indexmap::IndexSet::new();
        for metric in &metrics {
            if !seen.insert(metric.key.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate metric key '{}'",
                    metric.key
                )));
            }
        }

        let default_filters = match obj.get("filters") {
            Some(raw_filters) => crate::filter::parse_filters(raw_filters)?,
            None => FilterSet::new(),
        };

        let mut sort = BTreeMap::new();
        if let Some(raw_sort) = obj.get("sort").and_then(JsonValue::as_object) {
            for (level, directive) in raw_sort {
                let level: usize = level.parse().map_err(|_| {
                    Error::validation(format!("sort level '{level}' is not a number"))
                })?;
                sort.insert(level, parse_sort(directive)?);
            }
        }

        let mut formatting = Vec::new();
        if let Some(raw_rules) = obj.get("formatting").and_then(JsonValue::as_array) {
            for raw_rule in raw_rules {
                let metric = raw_rule
                    .get("metric")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| {
                        Error::validation("formatting rule requires a metric key")
                    })?;
                formatting.push(FormatRule {
                    metric: metric.to_string(),
                    rule: raw_rule.clone(),
                });
            }
        }

        Ok(PivotSpec {
            rows,
            columns,
            metrics,
            default_filters,
            sort,
            formatting,
        })
    }

    /// Base metrics in spec order.
    pub(crate) fn base_metrics(&self) -> impl Iterator<Item = (&MetricSpec, &str, MetricOp)> {
        self.metrics.iter().filter_map(|m| match &m.kind {
            MetricKind::Base { source_key, op } => Some((m, source_key.as_str(), *op)),
            MetricKind::Formula { .. } => None,
        })
    }

    /// Formula metrics in spec order.
    pub(crate) fn formula_metrics(
        &self,
    ) -> impl Iterator<Item = (&MetricSpec, &std::result::Result<Expr, ParseError>)> {
        self.metrics.iter().filter_map(|m| match &m.kind {
            MetricKind::Formula { compiled, .. } => Some((m, compiled)),
            MetricKind::Base { .. } => None,
        })
    }

    pub(crate) fn needs_distinct(&self) -> bool {
        self.base_metrics()
            .any(|(_, _, op)| op == MetricOp::CountDistinct)
    }
}

fn string_list(raw: Option<&JsonValue>) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| Error::validation("dimension fields must be an array"))?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or_else(|| Error::validation("dimension fields must be non-empty strings"))
        })
        .collect()
}

fn parse_metric(raw: &JsonValue) -> Result<MetricSpec> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("metric must be an object"))?;
    let label = obj
        .get("label")
        .and_then(JsonValue::as_str)
        .map(String::from);

    if let Some(expression) = obj
        .get("formula")
        .or_else(|| obj.get("expression"))
        .and_then(JsonValue::as_str)
    {
        let key = obj
            .get("key")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::validation("formula metric requires a key"))?;
        return Ok(MetricSpec {
            key: key.to_string(),
            label,
            kind: MetricKind::Formula {
                source: expression.to_string(),
                compiled: parse_formula(expression),
            },
        });
    }

    let op = obj
        .get("op")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::validation("metric requires an op or a formula"))?;
    let op = MetricOp::from_str(op)?;
    let source_key = obj
        .get("sourceKey")
        .or_else(|| obj.get("source"))
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::validation("metric requires a sourceKey"))?
        .to_string();
    let key = obj
        .get("key")
        .and_then(JsonValue::as_str)
        .map(String::from)
        .unwrap_or_else(|| format!("{}__{}", source_key, op.as_str()));

    Ok(MetricSpec {
        key,
        label,
        kind: MetricKind::Base { source_key, op },
    })
}

fn parse_sort(raw: &JsonValue) -> Result<SortSpec> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("sort directive must be an object"))?;
    let direction = match obj.get("dir").or_else(|| obj.get("direction")) {
        Some(dir) => SortDirection::from_str(
            dir.as_str()
                .ok_or_else(|| Error::validation("sort direction must be a string"))?,
        )?,
        None => SortDirection::default(),
    };
    if let Some(metric) = obj
        .get("byMetric")
        .or_else(|| obj.get("metric"))
        .and_then(JsonValue::as_str)
    {
        return Ok(SortSpec::ByMetric {
            metric: metric.to_string(),
            direction,
        });
    }
    Ok(SortSpec::ByValue(direction))
}

//! Chunked construction of a join lookup table
//!
//! Joined rows can arrive in chunks from a paging source. Filtering,
//! aggregation, and lookup construction are all incremental, and the finished
//! lookup is identical no matter how the rows were chunked. The batch path in
//! [`apply_join`](super::apply_join) pushes a single chunk through the same
//! builder.

use pvq_shared::record::{normalize_key_value, resolve_field, Record};
use pvq_shared::value::Value;

use crate::diag::Warnings;
use crate::error::{Error, Result};
use crate::limits::EngineLimits;

use super::aggregate::AggregateBuilder;
use super::{JoinSpec, Lookup};

/// Builds a join lookup table from chunks of joined rows.
#[derive(Debug)]
pub struct StreamingJoinBuilder<'a> {
    spec: &'a JoinSpec,
    limits: &'a EngineLimits,
    aggregate: Option<AggregateBuilder<'a>>,
    lookup: Lookup,
}

impl<'a> StreamingJoinBuilder<'a> {
    /// Create a builder for one join.
    #[must_use]
    pub fn new(spec: &'a JoinSpec, limits: &'a EngineLimits) -> Self {
        let aggregate = spec
            .aggregate
            .as_ref()
            .map(|agg| AggregateBuilder::new(agg, &spec.foreign_key));
        StreamingJoinBuilder {
            spec,
            limits,
            aggregate,
            lookup: Lookup::new(),
        }
    }

    /// Fold one chunk of joined rows into the lookup state.
    pub fn push_chunk(&mut self, rows: &[Record]) -> Result<()> {
        for row in rows {
            if !self.spec.filters.iter().all(|f| f.matches(row)) {
                continue;
            }
            if let Some(agg) = &mut self.aggregate {
                agg.push(row);
                if agg.group_count() > self.limits.max_lookup_keys {
                    return Err(Error::limit(
                        "join lookup keys",
                        self.limits.max_lookup_keys,
                        agg.group_count(),
                    ));
                }
                continue;
            }
            let key_value = resolve_field(row, &self.spec.foreign_key).unwrap_or(Value::Null);
            if key_value.is_blank() {
                continue;
            }
            let key = normalize_key_value(&key_value);
            if !self.lookup.contains_key(&key) && self.lookup.len() >= self.limits.max_lookup_keys {
                return Err(Error::limit(
                    "join lookup keys",
                    self.limits.max_lookup_keys,
                    self.lookup.len() + 1,
                ));
            }
            self.lookup.entry(key).or_default().push(row.clone());
        }
        Ok(())
    }

    /// Finalize into the lookup table. Aggregated joins collapse to one row
    /// per key here.
    #[must_use]
    pub fn finish(mut self, warnings: &mut Warnings) -> Lookup {
        if let Some(agg) = self.aggregate.take() {
            let groups = agg.finish(warnings);
            return groups
                .into_iter()
                .map(|(key, record)| (key, vec![record]))
                .collect();
        }
        self.lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;
    use serde_json::json;

    fn rows() -> Vec<Record> {
        vec![
            record_from([("oid", Value::Int(1)), ("amount", Value::Int(10))]),
            record_from([("oid", Value::Int(2)), ("amount", Value::Int(20))]),
            record_from([("oid", Value::Int(1)), ("amount", Value::Int(30))]),
            record_from([("oid", Value::Null), ("amount", Value::Int(40))]),
        ]
    }

    fn aggregated_spec() -> JoinSpec {
        JoinSpec::from_json(&json!({
            "rows": [],
            "localKey": "order_id",
            "foreignKey": "oid",
            "aggregate": {
                "groupBy": ["oid"],
                "metrics": [{"key": "total", "sourceKey": "amount", "op": "sum"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_chunking_invariance() {
        let spec = aggregated_spec();
        let limits = EngineLimits::default();
        let rows = rows();

        let mut whole = StreamingJoinBuilder::new(&spec, &limits);
        whole.push_chunk(&rows).unwrap();
        let mut w1 = Warnings::new();
        let batch = whole.finish(&mut w1);

        let mut chunked = StreamingJoinBuilder::new(&spec, &limits);
        for chunk in rows.chunks(1) {
            chunked.push_chunk(chunk).unwrap();
        }
        let mut w2 = Warnings::new();
        let streamed = chunked.finish(&mut w2);

        assert_eq!(batch, streamed);
        assert_eq!(
            batch.get("1").unwrap()[0].get("total"),
            Some(&Value::Float(40.0))
        );
    }

    #[test]
    fn test_lookup_key_limit() {
        let spec = JoinSpec::from_json(&json!({
            "rows": [],
            "localKey": "order_id",
            "foreignKey": "oid"
        }))
        .unwrap();
        // the fixture has two distinct non-blank keys; only the second is over
        let limits = EngineLimits {
            max_lookup_keys: 1,
            ..EngineLimits::default()
        };
        let mut builder = StreamingJoinBuilder::new(&spec, &limits);
        let err = builder.push_chunk(&rows()).unwrap_err();
        assert!(err.is_resource_limit());
    }

    #[test]
    fn test_filters_apply_before_lookup() {
        let spec = JoinSpec::from_json(&json!({
            "rows": [],
            "localKey": "order_id",
            "foreignKey": "oid",
            "filters": [{"key": "amount", "op": "gte", "value": 20}]
        }))
        .unwrap();
        let limits = EngineLimits::default();
        let mut builder = StreamingJoinBuilder::new(&spec, &limits);
        builder.push_chunk(&rows()).unwrap();
        let mut warnings = Warnings::new();
        let lookup = builder.finish(&mut warnings);
        assert_eq!(lookup.get("1").map(Vec::len), Some(1));
        assert_eq!(lookup.get("2").map(Vec::len), Some(1));
    }
}

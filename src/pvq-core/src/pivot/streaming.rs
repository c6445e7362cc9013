//! Chunked pivot accumulation
//!
//! Thin wrapper over the shared [`PivotBuilder`](super::engine::PivotBuilder):
//! chunks fold into the same bucket map the batch path uses, so `finish`
//! produces a view identical to a single-shot run over the concatenated
//! records. Group and unique-value ceilings are enforced on every push.

use pvq_shared::record::Record;

use crate::error::Result;
use crate::limits::EngineLimits;

use super::engine::{PivotBuilder, PivotView};
use super::PivotSpec;

/// Streaming pivot aggregation over record chunks.
#[derive(Debug)]
pub struct StreamingPivotBuilder<'a> {
    inner: PivotBuilder<'a>,
}

impl<'a> StreamingPivotBuilder<'a> {
    /// Create a builder for one pivot request.
    #[must_use]
    pub fn new(spec: &'a PivotSpec, limits: &'a EngineLimits) -> Self {
        StreamingPivotBuilder {
            inner: PivotBuilder::new(spec, limits),
        }
    }

    /// Fold one chunk of records into the aggregation state.
    pub fn push_chunk(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            self.inner.push(record)?;
        }
        Ok(())
    }

    /// Finalize into the output view. Terminal.
    #[must_use]
    pub fn finish(self) -> PivotView {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::engine::pivot;
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;
    use pvq_shared::value::Value;
    use serde_json::json;

    fn records() -> Vec<Record> {
        let mut out = Vec::new();
        for i in 0..7 {
            out.push(record_from([
                ("cls", Value::string(if i % 2 == 0 { "A" } else { "B" })),
                ("year", Value::Int(2023 + i64::from(i % 3))),
                ("value", Value::Int(i64::from(i) * 10)),
            ]));
        }
        out
    }

    fn spec() -> PivotSpec {
        PivotSpec::from_json(&json!({
            "rows": ["cls"],
            "columns": ["year"],
            "metrics": [
                {"key": "total", "sourceKey": "value", "op": "sum"},
                {"key": "n", "sourceKey": "value", "op": "count"},
                {"key": "mean", "formula": "total / n"}
            ],
            "sort": {"0": {"byMetric": "total", "dir": "desc"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_chunking_invariance() {
        let records = records();
        let spec = spec();
        let limits = EngineLimits::default();
        let batch = pivot(&records, &spec, &limits).unwrap();

        for chunk_size in [1, 2, records.len()] {
            let mut builder = StreamingPivotBuilder::new(&spec, &limits);
            for chunk in records.chunks(chunk_size) {
                builder.push_chunk(chunk).unwrap();
            }
            let streamed = builder.finish();
            assert_eq!(batch, streamed, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_limit_raised_mid_stream() {
        let spec = spec();
        let limits = EngineLimits {
            max_groups: 3,
            ..EngineLimits::default()
        };
        let mut builder = StreamingPivotBuilder::new(&spec, &limits);
        let mut failed = false;
        for chunk in records().chunks(2) {
            if builder.push_chunk(chunk).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }
}

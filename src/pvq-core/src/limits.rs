//! Operational ceilings
//!
//! Every ceiling the engines enforce lives in one explicit context object
//! passed down from the caller. There is no global settings lookup: embedders
//! construct one `EngineLimits` per deployment (or per request) and hand it to
//! the pipeline.

use serde::Deserialize;

/// Ceilings enforced by the pipeline and engines. Breaching any of them
/// aborts the request with [`Error::ResourceLimit`](crate::Error).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum base records after loading
    pub max_records: usize,
    /// Maximum records after joins (fan-out included)
    pub max_join_records: usize,
    /// Maximum distinct lookup keys per join
    pub max_lookup_keys: usize,
    /// Maximum (row, column) group pairs in a pivot
    pub max_groups: usize,
    /// Maximum distinct normalized values per pivot dimension field
    pub max_unique_values_per_dim: usize,
    /// Maximum options returned by the filter-options service
    pub max_filter_options: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        EngineLimits {
            max_records: 100_000,
            max_join_records: 200_000,
            max_lookup_keys: 50_000,
            max_groups: 50_000,
            max_unique_values_per_dim: 10_000,
            max_filter_options: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let limits: EngineLimits =
            serde_json::from_str(r#"{"max_groups": 12, "max_filter_options": 5}"#).unwrap();
        assert_eq!(limits.max_groups, 12);
        assert_eq!(limits.max_filter_options, 5);
        assert_eq!(limits.max_records, EngineLimits::default().max_records);
    }
}

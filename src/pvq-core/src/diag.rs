//! Warnings and per-join diagnostics
//!
//! Soft failures are reported, not raised. Warnings are deduplicated and keep
//! their first-seen order so a noisy expression over a million records still
//! reads as one line in the response.

use indexmap::IndexSet;
use serde::Serialize;

/// Deduplicating, insertion-ordered warning collector.
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    seen: IndexSet<String>,
}

impl Warnings {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Warnings::default()
    }

    /// Add a warning; duplicates are dropped.
    pub fn push(&mut self, message: impl Into<String>) {
        self.seen.insert(message.into());
    }

    /// Add many warnings.
    pub fn extend<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for message in messages {
            self.push(message);
        }
    }

    /// Number of distinct warnings
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no warnings were recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Consume into an ordered list
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.seen.into_iter().collect()
    }

    /// Borrow as an ordered iterator
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }
}

/// Per-join debug payload attached to pipeline results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinDebug {
    /// The join's result prefix, when configured
    pub prefix: Option<String>,
    /// Base record count before the join
    pub base_before: usize,
    /// Record count after the join (fan-out included)
    pub base_after: usize,
    /// Base records that found at least one match
    pub matched_rows: usize,
    /// First few normalized local-key values, for debugging key mismatches
    pub sample_keys: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dedup_preserves_order() {
        let mut warnings = Warnings::new();
        warnings.push("b");
        warnings.push("a");
        warnings.push("b");
        warnings.push("c");
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings.into_vec(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_join_debug_serializes_camel_case() {
        let debug = JoinDebug {
            prefix: Some("PLAN".to_string()),
            base_before: 10,
            base_after: 10,
            matched_rows: 7,
            sample_keys: vec!["k1".to_string()],
        };
        let json = serde_json::to_value(&debug).unwrap();
        assert_eq!(json["baseBefore"], 10);
        assert_eq!(json["matchedRows"], 7);
    }
}

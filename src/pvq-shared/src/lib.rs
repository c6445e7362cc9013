//! pvq-shared: shared types and utilities for pivotq crates
//!
//! This crate contains the untyped value model and the coercion, comparison,
//! and record-access rules used across the pivotq crates to keep every engine
//! (filters, joins, pivot aggregation) behaviorally consistent.
//!
//! # Features
//!
//! - **Value model**: JSON-like `Value` union with the engine's truthiness and
//!   cross-type numeric equality rules
//! - **Numeric coercion**: lenient and strict number coercion plus the shared
//!   comparison ladder
//! - **Date handling**: permissive date parsing and virtual date-part keys
//! - **Record access**: ordered records with the field-resolution fallback chain

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::uninlined_format_args
)]

/// Result type alias for shared operations
pub type Result<T> = anyhow::Result<T>;

/// Package version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core value types
pub mod value;

/// Numeric coercion and the shared comparison ladder
pub mod num;

/// Date parsing and virtual date-part keys
pub mod date;

/// Ordered records and field resolution
pub mod record;

pub use record::Record;
pub use value::{is_truthy, Value};

/// Common utility functions
pub mod utils {
    /// Check if a string is empty or whitespace-only
    #[must_use]
    pub fn is_blank(s: &str) -> bool {
        s.trim().is_empty()
    }
}

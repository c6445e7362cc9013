//! pivotq: analytical computation backend for report and dashboard pivot tables.
//!
//! This crate re-exports the workspace members:
//!
//! - [`pvq_shared`] — the untyped value model, coercion rules, and record access
//! - [`pvq_expr`] — the computed-field / formula expression engine
//! - [`pvq_core`] — filters, joins, pivot aggregation, and the records pipeline

pub use pvq_core as core;
pub use pvq_expr as expr;
pub use pvq_shared as shared;

pub use pvq_core::{Error, Result};
pub use pvq_shared::record::Record;
pub use pvq_shared::value::Value;

/// Package version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

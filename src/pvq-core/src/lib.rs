//! pvq-core: filter resolution, joins, pivot aggregation, and the records
//! pipeline
//!
//! The engines are synchronous and request-scoped; only the pipeline awaits
//! its record-source collaborator. Batch and streaming variants of the join
//! and pivot engines share their accumulation state, so a chunked run is
//! output-identical to a single-shot run.

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
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]

/// Warnings and per-join diagnostics
pub mod diag;

/// Error types
pub mod error;

/// Filter parsing, merging, matching, and cascading options
pub mod filter;

/// Join engine, batch and streaming
pub mod join;

/// Operational ceilings
pub mod limits;

/// The records pipeline
pub mod pipeline;

/// Pivot/aggregation engine, batch and streaming
pub mod pivot;

pub use diag::{JoinDebug, Warnings};
pub use error::{Error, Result};
pub use filter::{collect_options, FilterOptionsResult, FilterSelection, FilterSet};
pub use join::{apply_join, JoinSpec, StreamingJoinBuilder};
pub use limits::EngineLimits;
pub use pipeline::{
    build_pivot, build_pivot_streaming, build_records, ChunkedRecordSource, PipelineRequest,
    PipelineResult, PivotResult, RecordSource,
};
pub use pivot::{pivot, PivotSpec, PivotView, StreamingPivotBuilder};

//! pvq-expr: expression engine for computed fields and formula metrics
//!
//! Parses the report builder's expression language into an AST and evaluates
//! it against records (computed fields) or finalized metric maps (formula
//! metrics).
//!
//! ```
//! use pvq_expr::{parse, evaluate, RecordScope};
//! use pvq_shared::record::record_from;
//! use pvq_shared::value::Value;
//!
//! let expr = parse("{{value}} * 2").unwrap();
//! let record = record_from([("value", Value::Int(21))]);
//! let result = evaluate(&expr, &RecordScope(&record)).unwrap();
//! assert_eq!(result, Value::Float(42.0));
//! ```

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

/// AST types
pub mod ast;

/// Parse and evaluation errors
pub mod error;

/// Evaluation over scopes
pub mod eval;

/// Computed-field compilation and application
pub mod fields;

/// The nom-based parser
pub mod parser;

pub use ast::{BinaryOp, Expr, Function, Literal, UnaryOp};
pub use error::{EvalError, ParseError};
pub use eval::{evaluate, MetricScope, RecordScope, Scope};
pub use fields::{compile, split_by_join_dependency, CompiledField, ComputedFieldSpec};
pub use parser::{parse, parse_formula};

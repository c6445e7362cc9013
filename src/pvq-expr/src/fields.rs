//! Computed fields: compile once, apply to record batches
//!
//! A computed field is a key plus an expression. Compilation happens once per
//! request; a non-compiling expression degrades to null for every record with
//! a single compile warning, and evaluation failures on individual records
//! degrade to null with a single runtime warning per field key.

use serde::Deserialize;

use pvq_shared::record::Record;
use pvq_shared::value::Value;

use crate::ast::Expr;
use crate::error::{EvalError, ParseError};
use crate::eval::{evaluate, RecordScope};
use crate::parser::parse;

/// Declarative computed-field configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputedFieldSpec {
    /// Output key written into each record
    pub key: String,
    /// Optional display label
    #[serde(default)]
    pub label: Option<String>,
    /// Expression source
    pub expression: String,
}

/// A compiled computed field. A failed compile is kept so the field still
/// writes nulls and reports itself once.
#[derive(Debug, Clone)]
pub struct CompiledField {
    /// Output key
    pub key: String,
    /// Optional display label
    pub label: Option<String>,
    compiled: Result<Expr, ParseError>,
}

/// Compile a batch of computed-field specs. Never fails: a bad expression
/// produces a field that yields null everywhere.
#[must_use]
pub fn compile(specs: &[ComputedFieldSpec]) -> Vec<CompiledField> {
    specs
        .iter()
        .map(|spec| CompiledField {
            key: spec.key.clone(),
            label: spec.label.clone(),
            compiled: parse(&spec.expression),
        })
        .collect()
}

impl CompiledField {
    /// Whether the expression compiled.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_ok()
    }

    /// Evaluate against one record. A field that failed to compile yields
    /// null.
    pub fn evaluate(&self, record: &Record) -> Result<Value, EvalError> {
        match &self.compiled {
            Ok(expr) => evaluate(expr, &RecordScope(record)),
            Err(_) => Ok(Value::Null),
        }
    }

    /// Evaluate and write the result into every record.
    ///
    /// A non-compiling field writes null everywhere and pushes one compile
    /// warning. A failing record gets null; the first failure per field
    /// pushes one warning, subsequent ones are silent.
    pub fn apply(&self, records: &mut [Record], warnings: &mut Vec<String>) {
        let expr = match &self.compiled {
            Ok(expr) => expr,
            Err(e) => {
                let message = format!("Computed field '{}' failed to compile: {e}", self.key);
                log::warn!("{message}");
                warnings.push(message);
                for record in records.iter_mut() {
                    record.insert(self.key.clone(), Value::Null);
                }
                return;
            }
        };
        let mut warned = false;
        for record in records.iter_mut() {
            let value = match evaluate(expr, &RecordScope(record)) {
                Ok(v) => v,
                Err(e) => {
                    if !warned {
                        let message = format!("Computed field '{}': {e}", self.key);
                        log::warn!("{message}");
                        warnings.push(message);
                        warned = true;
                    }
                    Value::Null
                }
            };
            record.insert(self.key.clone(), value);
        }
    }

    /// Whether any `{{ref}}`'s first dot segment names one of the prefixes.
    #[must_use]
    pub fn references_prefix(&self, prefixes: &[&str]) -> bool {
        let Ok(expr) = &self.compiled else {
            return false;
        };
        expr.field_refs().iter().any(|r| {
            r.split('.')
                .next()
                .is_some_and(|head| prefixes.contains(&head))
        })
    }
}

/// Partition compiled fields into pre-join and post-join phases.
///
/// A field referencing a join's result prefix must run after that join. When
/// some configured join has no result prefix its output keys are
/// unpredictable, so every field runs in both phases.
#[must_use]
pub fn split_by_join_dependency<'a>(
    fields: &'a [CompiledField],
    join_prefixes: &[Option<&str>],
) -> (Vec<&'a CompiledField>, Vec<&'a CompiledField>) {
    if join_prefixes.is_empty() {
        return (fields.iter().collect(), Vec::new());
    }
    if join_prefixes.iter().any(Option::is_none) {
        let all: Vec<&CompiledField> = fields.iter().collect();
        return (all.clone(), all);
    }
    let prefixes: Vec<&str> = join_prefixes.iter().filter_map(|p| *p).collect();
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for field in fields {
        if field.references_prefix(&prefixes) {
            post.push(field);
        } else {
            pre.push(field);
        }
    }
    (pre, post)
}

//! Expression evaluation
//!
//! Expressions evaluate against a [`Scope`]: computed fields resolve
//! `{{refs}}` through a record's field-resolution chain, formula metrics
//! resolve names against the finalized metric values at one pivot scope.
//!
//! Evaluation never panics and never aborts a request. Coercion failures come
//! back as [`EvalError`] and the caller decides what a failed cell is worth
//! (a null plus a warning, in every current caller).

use pvq_shared::date::{date_part_value, epoch_ms, parse_date, DatePart};
use pvq_shared::num::{coerce_number, compare_values, values_equal};
use pvq_shared::record::{resolve_field, Record};
use pvq_shared::value::{is_truthy, Value};

use crate::ast::{BinaryOp, Expr, Function, Literal, UnaryOp};
use crate::error::EvalError;

/// Name resolution for expression evaluation.
pub trait Scope {
    /// Resolve a `{{field}}` reference.
    fn field(&self, path: &str) -> Result<Value, EvalError>;

    /// Resolve a bare identifier.
    fn ident(&self, name: &str) -> Result<Value, EvalError>;
}

/// Scope over a single record. Missing fields are null, not errors.
pub struct RecordScope<'a>(pub &'a Record);

impl Scope for RecordScope<'_> {
    fn field(&self, path: &str) -> Result<Value, EvalError> {
        Ok(resolve_field(self.0, path).unwrap_or(Value::Null))
    }

    fn ident(&self, name: &str) -> Result<Value, EvalError> {
        Err(EvalError::unresolved(name))
    }
}

/// Scope over finalized metric values at one pivot cell scope.
///
/// Both `{{key}}` references and bare identifiers resolve against the metric
/// map; a missing key is an error so the caller can null the cell and warn.
pub struct MetricScope<'a> {
    metrics: &'a indexmap::IndexMap<String, Value>,
}

impl<'a> MetricScope<'a> {
    /// Wrap a metric-key map.
    #[must_use]
    pub fn new(metrics: &'a indexmap::IndexMap<String, Value>) -> Self {
        MetricScope { metrics }
    }
}

impl Scope for MetricScope<'_> {
    fn field(&self, path: &str) -> Result<Value, EvalError> {
        self.ident(path)
    }

    fn ident(&self, name: &str) -> Result<Value, EvalError> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::unresolved(name))
    }
}

/// Evaluate an expression against a scope.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Field(path) => scope.field(path),
        Expr::Ident(name) => scope.ident(name),
        Expr::Unary { op, expr } => eval_unary(*op, expr, scope),
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, scope),
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            let cond_value = evaluate(cond, scope)?;
            if is_truthy(&cond_value) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Call { function, args } => eval_call(*function, args, scope),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn eval_unary(op: UnaryOp, expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    let value = evaluate(expr, scope)?;
    match op {
        UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
        UnaryOp::Neg => Ok(Value::Float(-as_number(&value)?)),
        UnaryOp::Pos => Ok(Value::Float(as_number(&value)?)),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    scope: &dyn Scope,
) -> Result<Value, EvalError> {
    // Short-circuit logic returns the deciding operand, not a boolean
    match op {
        BinaryOp::Or => {
            let lhs = evaluate(left, scope)?;
            if is_truthy(&lhs) {
                return Ok(lhs);
            }
            return evaluate(right, scope);
        }
        BinaryOp::And => {
            let lhs = evaluate(left, scope)?;
            if !is_truthy(&lhs) {
                return Ok(lhs);
            }
            return evaluate(right, scope);
        }
        _ => {}
    }

    let lhs = evaluate(left, scope)?;
    let rhs = evaluate(right, scope)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Gt => Ok(Value::Bool(matches!(
            compare_values(&lhs, &rhs),
            Some(std::cmp::Ordering::Greater)
        ))),
        BinaryOp::Ge => Ok(Value::Bool(matches!(
            compare_values(&lhs, &rhs),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ))),
        BinaryOp::Lt => Ok(Value::Bool(matches!(
            compare_values(&lhs, &rhs),
            Some(std::cmp::Ordering::Less)
        ))),
        BinaryOp::Le => Ok(Value::Bool(matches!(
            compare_values(&lhs, &rhs),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ))),
        BinaryOp::Add => Ok(Value::Float(as_number(&lhs)? + as_number(&rhs)?)),
        BinaryOp::Sub => Ok(Value::Float(as_number(&lhs)? - as_number(&rhs)?)),
        BinaryOp::Mul => Ok(Value::Float(as_number(&lhs)? * as_number(&rhs)?)),
        BinaryOp::Div => {
            let divisor = as_number(&rhs)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Float(as_number(&lhs)? / divisor))
        }
        BinaryOp::Mod => {
            let divisor = as_number(&rhs)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let dividend = as_number(&lhs)?;
            // Modulo takes the sign of the divisor
            Ok(Value::Float(
                dividend - divisor * (dividend / divisor).floor(),
            ))
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
    }
}

fn eval_call(function: Function, args: &[Expr], scope: &dyn Scope) -> Result<Value, EvalError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, scope)?);
    }

    match function {
        Function::Date => Ok(match parse_date(&values[0]) {
            Some(dt) => Value::String(format!(
                "{}-{}-{}",
                date_part_value(dt, DatePart::Year),
                date_part_value(dt, DatePart::Month),
                date_part_value(dt, DatePart::Day)
            )),
            None => Value::Null,
        }),
        Function::Number => Ok(Value::Float(as_number(&values[0])?)),
        Function::Text => Ok(Value::String(match &values[0] {
            Value::Null => String::new(),
            other => other.to_string(),
        })),
        Function::Len => Ok(Value::Int(value_len(&values[0]))),
        Function::Empty => Ok(Value::Bool(is_empty(&values[0]))),
        Function::Ts => Ok(epoch_ms(&values[0]).map_or(Value::Null, Value::Int)),
        Function::DateDiff => {
            let unit = values
                .get(2)
                .map(|v| v.to_string().to_lowercase())
                .unwrap_or_default();
            date_diff(&values[0], &values[1], unit_divisor(&unit))
        }
        Function::HoursBetween => date_diff(&values[0], &values[1], 3_600_000.0),
        Function::DaysBetween => date_diff(&values[0], &values[1], 86_400_000.0),
    }
}

fn date_diff(start: &Value, end: &Value, divisor: f64) -> Result<Value, EvalError> {
    match (epoch_ms(start), epoch_ms(end)) {
        (Some(a), Some(b)) => Ok(Value::Float((b - a) as f64 / divisor)),
        _ => Ok(Value::Null),
    }
}

fn unit_divisor(unit: &str) -> f64 {
    match unit {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "minute" | "minutes" => 60_000.0,
        "h" | "hour" | "hours" => 3_600_000.0,
        // day is the default, unknown units included
        _ => 86_400_000.0,
    }
}

fn value_len(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::String(s) => s.chars().count() as i64,
        Value::Array(arr) => arr.len() as i64,
        Value::Object(obj) => obj.len() as i64,
        other => other.to_string().chars().count() as i64,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn as_number(value: &Value) -> Result<f64, EvalError> {
    coerce_number(value).map_err(|e| EvalError::number(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_formula};
    use pretty_assertions::assert_eq;
    use pvq_shared::record::record_from;

    fn eval_on(expr: &str, record: &Record) -> Result<Value, EvalError> {
        let parsed = parse(expr).unwrap();
        evaluate(&parsed, &RecordScope(record))
    }

    fn sample() -> Record {
        record_from([
            ("value", Value::Int(10)),
            ("ratio", Value::Float(0.5)),
            ("name", Value::string("west")),
            ("numish", Value::string("4")),
            ("flag", Value::Bool(true)),
            ("gone", Value::Null),
            ("start", Value::string("2026-03-01")),
            ("end", Value::string("2026-03-03")),
        ])
    }

    #[test]
    fn test_arithmetic() {
        let rec = sample();
        assert_eq!(eval_on("{{value}} + 1", &rec).unwrap(), Value::Float(11.0));
        assert_eq!(
            eval_on("{{value}} * {{ratio}}", &rec).unwrap(),
            Value::Float(5.0)
        );
        assert_eq!(
            eval_on("{{value}} / {{numish}}", &rec).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(eval_on("7 % 3", &rec).unwrap(), Value::Float(1.0));
        // modulo takes the divisor's sign
        assert_eq!(eval_on("(0 - 7) % 3", &rec).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_arithmetic_errors() {
        let rec = sample();
        assert!(matches!(
            eval_on("{{name}} + 1", &rec).unwrap_err(),
            EvalError::Number { .. }
        ));
        assert_eq!(
            eval_on("{{value}} / 0", &rec).unwrap_err(),
            EvalError::DivisionByZero
        );
        // null is not a number either
        assert!(eval_on("{{gone}} + 1", &rec).is_err());
    }

    #[test]
    fn test_comparisons() {
        let rec = sample();
        assert_eq!(eval_on("{{value}} > 9", &rec).unwrap(), Value::Bool(true));
        // numeric-looking strings compare numerically
        assert_eq!(
            eval_on("{{numish}} < {{value}}", &rec).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_on("{{name}} == 'west'", &rec).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_on("{{gone}} == null", &rec).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval_on("{{gone}} == 0", &rec).unwrap(), Value::Bool(false));
        // relational against null is always false
        assert_eq!(eval_on("{{gone}} < 1", &rec).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_logic_returns_operands() {
        let rec = sample();
        assert_eq!(
            eval_on("{{gone}} || 'fallback'", &rec).unwrap(),
            Value::string("fallback")
        );
        assert_eq!(
            eval_on("{{name}} && {{value}}", &rec).unwrap(),
            Value::Int(10)
        );
        assert_eq!(eval_on("0 && {{name}}", &rec).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let rec = sample();
        // rhs would fail numeric coercion, but it is never evaluated
        assert_eq!(
            eval_on("{{flag}} || {{name}} + 1", &rec).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_on("{{gone}} && {{name}} + 1", &rec).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_ternary() {
        let rec = sample();
        assert_eq!(
            eval_on("{{value}} > 5 ? 'big' : 'small'", &rec).unwrap(),
            Value::string("big")
        );
        assert_eq!(
            eval_on("{{gone}} ? 1 : 2", &rec).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_missing_fields_are_null() {
        let rec = sample();
        assert_eq!(eval_on("{{absent}}", &rec).unwrap(), Value::Null);
        assert_eq!(
            eval_on("empty({{absent}})", &rec).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_functions() {
        let rec = sample();
        assert_eq!(
            eval_on("date({{start}})", &rec).unwrap(),
            Value::string("2026-03-01")
        );
        assert_eq!(eval_on("date({{name}})", &rec).unwrap(), Value::Null);
        assert_eq!(
            eval_on("number({{numish}})", &rec).unwrap(),
            Value::Float(4.0)
        );
        assert!(eval_on("number({{name}})", &rec).is_err());
        assert_eq!(
            eval_on("text({{value}})", &rec).unwrap(),
            Value::string("10")
        );
        assert_eq!(eval_on("text({{gone}})", &rec).unwrap(), Value::string(""));
        assert_eq!(eval_on("len({{name}})", &rec).unwrap(), Value::Int(4));
        assert_eq!(eval_on("empty({{gone}})", &rec).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_on("empty({{name}})", &rec).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_date_functions() {
        let rec = sample();
        assert_eq!(
            eval_on("days_between({{start}}, {{end}})", &rec).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            eval_on("hours_between({{start}}, {{end}})", &rec).unwrap(),
            Value::Float(48.0)
        );
        assert_eq!(
            eval_on("datediff({{start}}, {{end}})", &rec).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            eval_on("datediff({{start}}, {{end}}, 'h')", &rec).unwrap(),
            Value::Float(48.0)
        );
        assert_eq!(
            eval_on("datediff({{start}}, {{name}})", &rec).unwrap(),
            Value::Null
        );
        let ts = eval_on("ts({{start}})", &rec).unwrap();
        assert_eq!(ts, Value::Int(1772323200000));
    }

    #[test]
    fn test_formula_scope() {
        let mut metrics = indexmap::IndexMap::new();
        metrics.insert("value__sum".to_string(), Value::Float(50.0));
        metrics.insert("count__all".to_string(), Value::Int(5));
        let scope = MetricScope::new(&metrics);

        let expr = parse_formula("value__sum / count__all").unwrap();
        assert_eq!(evaluate(&expr, &scope).unwrap(), Value::Float(10.0));

        let expr = parse_formula("missing__metric + 1").unwrap();
        assert!(matches!(
            evaluate(&expr, &scope).unwrap_err(),
            EvalError::Unresolved { .. }
        ));
    }
}

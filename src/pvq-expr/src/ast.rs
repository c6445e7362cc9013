//! AST types for the computed-field expression language

use serde::Serialize;

/// A parsed expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Literal value
    Literal(Literal),
    /// Record field reference, written `{{path.to.field}}`
    Field(String),
    /// Bare identifier, only valid in formula mode where it names a sibling
    /// metric
    Ident(String),
    /// Unary operation
    Unary {
        /// The operator
        op: UnaryOp,
        /// The operand
        expr: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// The operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Ternary conditional `cond ? then : otherwise`
    Ternary {
        /// Condition
        cond: Box<Expr>,
        /// Value when the condition is truthy
        then: Box<Expr>,
        /// Value when the condition is falsy
        otherwise: Box<Expr>,
    },
    /// Builtin function call
    Call {
        /// The function
        function: Function,
        /// Argument expressions
        args: Vec<Expr>,
    },
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    /// null
    Null,
    /// true / false
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    String(String),
}

/// Binary operators, lowest to highest precedence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    /// Logical or (short-circuit)
    Or,
    /// Logical and (short-circuit)
    And,
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Greater than
    Gt,
    /// Greater or equal
    Ge,
    /// Less than
    Lt,
    /// Less or equal
    Le,
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Modulo (sign follows the divisor)
    Mod,
}

impl BinaryOp {
    /// Source spelling of the operator
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    /// Logical not
    Not,
    /// Numeric negation
    Neg,
    /// Numeric identity (forces coercion)
    Pos,
}

/// Builtin functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Function {
    /// `date(x)` — parse into an ISO date string
    Date,
    /// `number(x)` — strict numeric coercion
    Number,
    /// `text(x)` — render as string, null becomes ""
    Text,
    /// `len(x)` — length of a string or collection
    Len,
    /// `empty(x)` — null/blank/empty-collection test
    Empty,
    /// `ts(x)` — epoch milliseconds of a date-coercible value
    Ts,
    /// `datediff(start, end[, unit])`
    DateDiff,
    /// `hours_between(start, end)`
    HoursBetween,
    /// `days_between(start, end)`
    DaysBetween,
}

impl Function {
    /// The source-level function name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Date => "date",
            Function::Number => "number",
            Function::Text => "text",
            Function::Len => "len",
            Function::Empty => "empty",
            Function::Ts => "ts",
            Function::DateDiff => "datediff",
            Function::HoursBetween => "hours_between",
            Function::DaysBetween => "days_between",
        }
    }

    /// Inclusive argument-count range, checked at parse time.
    #[must_use]
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Date
            | Function::Number
            | Function::Text
            | Function::Len
            | Function::Empty
            | Function::Ts => (1, 1),
            Function::DateDiff => (2, 3),
            Function::HoursBetween | Function::DaysBetween => (2, 2),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Field(path) => write!(f, "{{{{{path}}}}}"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Unary { op, expr } => {
                let op_str = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Pos => "+",
                };
                write!(f, "{op_str}{expr}")
            }
            Expr::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => write!(f, "({cond} ? {then} : {otherwise})"),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.as_str())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(fl) => write!(f, "{fl}"),
            Literal::String(s) => write!(f, "\"{s}\""),
        }
    }
}

impl Expr {
    /// Collect every `{{field}}` reference in the expression, in source order.
    #[must_use]
    pub fn field_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Expr::Field(path) => refs.push(path),
            Expr::Unary { expr, .. } => expr.collect_refs(refs),
            Expr::Binary { left, right, .. } => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_refs(refs);
                then.collect_refs(refs);
                otherwise.collect_refs(refs);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(refs);
                }
            }
            Expr::Literal(_) | Expr::Ident(_) => {}
        }
    }

    /// First bare identifier in the expression, if any.
    #[must_use]
    pub fn first_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::Literal(_) | Expr::Field(_) => None,
            Expr::Unary { expr, .. } => expr.first_ident(),
            Expr::Binary { left, right, .. } => left.first_ident().or_else(|| right.first_ident()),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => cond
                .first_ident()
                .or_else(|| then.first_ident())
                .or_else(|| otherwise.first_ident()),
            Expr::Call { args, .. } => args.iter().find_map(Expr::first_ident),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_round_trips_shape() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Field("value".to_string())),
            right: Box::new(Expr::Literal(Literal::Int(1))),
        };
        assert_eq!(expr.to_string(), "({{value}} + 1)");
    }

    #[test]
    fn test_field_refs_in_order() {
        let expr = Expr::Binary {
            op: BinaryOp::Div,
            left: Box::new(Expr::Field("a.x".to_string())),
            right: Box::new(Expr::Call {
                function: Function::Number,
                args: vec![Expr::Field("b".to_string())],
            }),
        };
        assert_eq!(expr.field_refs(), vec!["a.x", "b"]);
    }

    #[test]
    fn test_arity_table() {
        assert_eq!(Function::DateDiff.arity(), (2, 3));
        assert_eq!(Function::Len.arity(), (1, 1));
    }
}

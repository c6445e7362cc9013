//! Error types for the expression engine

use std::fmt;

/// Errors raised while parsing an expression. These abort the whole request.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid syntax
    InvalidSyntax {
        /// Description of the syntax error
        message: String,
    },

    /// Unterminated string literal
    UnterminatedString,

    /// Invalid number literal
    InvalidNumber {
        /// The invalid number string
        number: String,
    },

    /// Unknown function name
    UnknownFunction {
        /// The function name
        name: String,
    },

    /// Wrong number of arguments to a builtin function
    WrongArity {
        /// The function name
        function: String,
        /// Minimum accepted argument count
        min: usize,
        /// Maximum accepted argument count
        max: usize,
        /// Actual argument count
        actual: usize,
    },

    /// Bare identifier outside formula mode
    UnknownIdentifier {
        /// The identifier
        name: String,
    },

    /// Empty field reference `{{}}`
    EmptyFieldRef,

    /// Empty input
    EmptyInput,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidSyntax { message } => {
                write!(f, "Invalid syntax: {message}")
            }
            ParseError::UnterminatedString => write!(f, "Unterminated string literal"),
            ParseError::InvalidNumber { number } => write!(f, "Invalid number '{number}'"),
            ParseError::UnknownFunction { name } => write!(f, "Unknown function '{name}'"),
            ParseError::WrongArity {
                function,
                min,
                max,
                actual,
            } => {
                if min == max {
                    write!(
                        f,
                        "Function '{function}' expects {min} argument(s), got {actual}"
                    )
                } else {
                    write!(
                        f,
                        "Function '{function}' expects {min} to {max} arguments, got {actual}"
                    )
                }
            }
            ParseError::UnknownIdentifier { name } => {
                write!(f, "Unknown identifier '{name}'")
            }
            ParseError::EmptyFieldRef => write!(f, "Empty field reference"),
            ParseError::EmptyInput => write!(f, "Empty expression"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Result type for parsing operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while evaluating an expression.
///
/// These never abort a request: callers write a null result and record a
/// warning instead.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A non-numeric operand reached arithmetic
    Number {
        /// Description of the offending value
        message: String,
    },

    /// Division or modulo by zero
    DivisionByZero,

    /// Identifier with no binding in the evaluation scope
    Unresolved {
        /// The identifier or field path
        name: String,
    },
}

impl EvalError {
    /// Build a numeric-coercion error
    pub fn number(message: impl Into<String>) -> Self {
        EvalError::Number {
            message: message.into(),
        }
    }

    /// Build an unresolved-name error
    pub fn unresolved(name: impl Into<String>) -> Self {
        EvalError::Unresolved { name: name.into() }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Number { message } => write!(f, "{message}"),
            EvalError::DivisionByZero => write!(f, "Division by zero"),
            EvalError::Unresolved { name } => write!(f, "Unresolved name '{name}'"),
        }
    }
}

impl std::error::Error for EvalError {}

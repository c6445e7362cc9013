//! Error types for the pivotq engines
//!
//! Three families of failure exist and they are handled very differently:
//! validation/compile errors and resource-limit breaches abort a request,
//! while per-record evaluation failures degrade to null plus a warning and
//! never surface here. See [`crate::diag::Warnings`] for the latter.

use std::borrow::Cow;

use thiserror::Error;

/// Result type alias for pivotq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pivotq operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid request configuration (bad join/aggregate/filter/pivot spec)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Expression failed to parse
    #[error("Expression error: {0}")]
    Expression(#[from] pvq_expr::ParseError),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operational ceiling was breached
    #[error("Resource limit exceeded: {what} ({actual} > {limit})")]
    ResourceLimit {
        /// What was being counted
        what: &'static str,
        /// The configured ceiling
        limit: usize,
        /// The observed count
        actual: usize,
    },

    /// Collaborator (record source) errors
    #[error("Source error: {0}")]
    Source(#[from] anyhow::Error),

    /// General operation errors
    #[error("Operation error: {0}")]
    Operation(Cow<'static, str>),
}

impl Error {
    /// Create a validation error with a custom message
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an operation error with a custom message
    pub fn operation(msg: impl Into<Cow<'static, str>>) -> Self {
        Error::Operation(msg.into())
    }

    /// Create a resource-limit error
    #[must_use]
    pub fn limit(what: &'static str, limit: usize, actual: usize) -> Self {
        Error::ResourceLimit {
            what,
            limit,
            actual,
        }
    }

    /// Whether this error is a resource-limit breach
    #[must_use]
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Error::ResourceLimit { .. })
    }
}

//! Error taxonomy for the query engine.
//!
//! Every validation boundary returns one of these kinds; the compiler is
//! only ever handed inputs that already passed validation. All variants
//! except `ExecutionFailure` are client-visible rejections.

use thiserror::Error;

/// Errors raised by the query & mutation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or over-length table/column name.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Table or column outside the allow-list, including reserved-word and
    /// blacklist hits.
    #[error("not accessible: {0}")]
    NotAccessible(String),

    /// Injection-signature match or structural violation in a value.
    #[error("malicious input rejected: {0}")]
    MaliciousInput(String),

    /// Pagination out of bounds.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Operator token not in the supported set.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// UPDATE/DELETE with zero filters.
    #[error("{0} requires at least one filter")]
    MissingFilter(&'static str),

    /// Permission-enforcer rejection.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Underlying statement error; the mutation transaction has already
    /// been rolled back when this surfaces.
    #[error("execution failed: {0}")]
    ExecutionFailure(String),
}

impl EngineError {
    /// Whether this error is safe to return verbatim to the caller.
    ///
    /// `ExecutionFailure` detail stays in the logs unless error disclosure
    /// is explicitly enabled in configuration.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ExecutionFailure(_))
    }

    /// Short stable tag for responses and audit rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::NotAccessible(_) => "not_accessible",
            Self::MaliciousInput(_) => "malicious_input",
            Self::InvalidRange(_) => "invalid_range",
            Self::UnsupportedOperator(_) => "unsupported_operator",
            Self::MissingFilter(_) => "missing_filter",
            Self::Forbidden(_) => "forbidden",
            Self::ExecutionFailure(_) => "execution_failure",
        }
    }
}

//! Error types for gale-router

use thiserror::Error;

/// Result type alias for pattern operations
pub type Result<T> = std::result::Result<T, PatternError>;

/// Malformed url expressions
///
/// Matching never fails hard: callers log these and treat the expression
/// as a non-match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A `:` segment without a parameter name
    #[error("Empty parameter name in expression: {0}")]
    EmptyParam(String),
}

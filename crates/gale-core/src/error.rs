//! Error types for gale-core

use thiserror::Error;

/// Result type alias for gale operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the gale dispatch engine
///
/// None of these are fatal to the server: the dispatch boundary turns
/// every one of them into a terminal response.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Filter or handler body failed (or panicked)
    #[error("Body execution failed: {0}")]
    Body(String),

    /// Session store get/set/del failure
    #[error("Session store error: {0}")]
    Store(String),

    /// Request body or multipart parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Hyper error (native only)
    #[cfg(feature = "native")]
    #[error("HTTP error: {0}")]
    Hyper(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for body failures raised from user code
    pub fn body(message: impl Into<String>) -> Self {
        Error::Body(message.into())
    }
}

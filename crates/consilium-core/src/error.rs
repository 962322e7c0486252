//! Error types for the Consilium registry.

use thiserror::Error;

/// Result type alias using consilium's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for registry operations.
///
/// Integrity mismatches are deliberately absent: a hash that no longer
/// matches is recorded data (`IntegrityRecord`), not a failure. Tool
/// timeouts are likewise folded into non-zero exit codes by the command
/// runner and never surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found by doc_id
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Job not found by id
    #[error("Job not found: {0}")]
    JobNotFound(i64),

    /// Malformed payload, unknown job type, bad request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Content store fetch/put/update failure
    #[error("Content store error: {0}")]
    ExternalService(String),

    /// A required external tool binary is absent
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

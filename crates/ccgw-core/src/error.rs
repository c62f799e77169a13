//! Error types for the ccgw core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for ccgw operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Path is empty, malformed, or escapes its base directory
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Event record could not be interpreted
    #[error("Failed to parse event record: {0}")]
    NdjsonParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

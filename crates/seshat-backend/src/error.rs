//! Error types for backend operations.

use thiserror::Error;

/// Errors that can occur while executing queries against a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Database connection or statement execution failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error while opening the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was already released via `close()`.
    #[error("Connection is closed")]
    ConnectionClosed,
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

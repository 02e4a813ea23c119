//! Error types for session store operations.

use thiserror::Error;

/// Errors that can occur in the session store.
#[derive(Debug, Error)]
pub enum Error {
    /// Query execution against the backend failed.
    #[error("Backend error: {0}")]
    Backend(#[from] seshat_backend::BackendError),

    /// Session payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration was rejected before any query executed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store initialization (table setup) failed.
    #[error("Store initialization failed: {0}")]
    Init(String),

    /// A query returned a row shape the store cannot interpret.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Configuration validation errors, raised at set-time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A column-name override used a key outside the allowed set.
    #[error("unknown column name key \"{key}\" (allowed: session_id, expires, data)")]
    UnknownColumnName {
        /// The rejected key.
        key: String,
    },

    /// The sweep interval was set to zero, which cannot drive a timer.
    #[error("check_expiration_interval must be greater than zero")]
    ZeroCheckExpirationInterval,
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Core error types shared by the collaborator seams.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the storage and notification collaborators.
///
/// Transient connectivity failures are retried inside the collaborator;
/// by the time an error reaches this type the collaborator has given up.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record that was expected to exist is missing
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// A record with the same identity already exists
    #[error("Record already exists: {0}")]
    RecordExists(String),

    /// Transaction could not be committed or rolled back
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Notification collaborator failure
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

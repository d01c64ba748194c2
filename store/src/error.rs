//! Error types for file-backed collaborators.

use deckgen_core::DeckError;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from file-backed collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create a storage directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read a file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write a file.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Identifier that cannot be used as a file name.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for DeckError {
    fn from(err: StoreError) -> Self {
        DeckError::Persistence(err.to_string())
    }
}

/// Reject identifiers that would escape the storage directory.
pub(crate) fn check_file_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.contains("..")
    {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

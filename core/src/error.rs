//! Error types for the generation pipeline.
//!
//! Expected generation failures are not errors: the stage caller returns a
//! structured [`crate::stage::StageFailure`] and the pipeline always returns a
//! [`crate::model::ModuleResult`]. `DeckError` is for misconfiguration and for
//! collaborator failures that the pipeline folds into its result.

use thiserror::Error;

/// Result type alias for deckgen operations.
pub type Result<T> = std::result::Result<T, DeckError>;

/// Errors that can occur around the generation pipeline.
#[derive(Error, Debug)]
pub enum DeckError {
    /// Invalid configuration or missing collaborator.
    #[error("configuration error: {0}")]
    Config(String),

    /// Chunk retrieval failed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Deck persistence failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Content-acquisition queue failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

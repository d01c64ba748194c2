//! Error types for generation clients.

use thiserror::Error;

/// Result type alias for generation client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors returned by an [`crate::LlmClient`].
///
/// Display strings carry the status code or transport condition because
/// callers classify retryability from the message text.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider not configured (missing API key, unknown model...).
    #[error("generation provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Non-success HTTP status from the provider.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limit exceeded (429), retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The request did not complete in time at the transport level.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Provider answered but the payload had no usable text.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other HTTP errors.
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_connect() {
            LlmError::Connection(err.to_string())
        } else {
            LlmError::Http(err)
        }
    }
}

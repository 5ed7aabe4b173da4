//! Error types for the request tracing layer.

use thiserror::Error;

use apixt_trace::TraceError;

/// Result type alias for tracing layer operations.
pub type Result<T> = std::result::Result<T, ApixtError>;

/// Errors that can occur while configuring or running the tracing layer.
#[derive(Debug, Error)]
pub enum ApixtError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by the trace recorder.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// The response body could not be captured.
    #[error("Body capture error: {0}")]
    Body(String),
}

impl From<toml::de::Error> for ApixtError {
    fn from(e: toml::de::Error) -> Self {
        ApixtError::Config(e.to_string())
    }
}

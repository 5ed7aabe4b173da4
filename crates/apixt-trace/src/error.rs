//! Error types for the trace recorder.

use thiserror::Error;

/// Result type alias for recorder operations.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors raised by the recorder.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The instrumented code broke the recorder's call protocol
    /// (e.g. closing details that were never opened).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Block content could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TraceError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        TraceError::Protocol(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceError::protocol("no timer named \"db\"");
        assert_eq!(err.to_string(), "Protocol error: no timer named \"db\"");
    }
}

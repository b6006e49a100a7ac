//! Completion adapter error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while setting up or consuming a completion stream.
///
/// These never cross the wire; clients only ever see a generic retry message
/// while the full error is logged server-side.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The API key environment variable is missing or empty.
    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The streaming request could not be initiated.
    #[error("completion request could not be started: {0}")]
    Request(String),

    /// The provider stream failed mid-flight.
    #[error("completion stream failed: {0}")]
    Stream(String),

    /// The provider stopped responding.
    #[error("completion provider timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompletionError::MissingApiKey("OPENAI_API_KEY".to_string());
        assert_eq!(
            err.to_string(),
            "missing API key: environment variable OPENAI_API_KEY is not set"
        );

        let err = CompletionError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("timed out"));
    }
}

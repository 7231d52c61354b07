//! Unified error types for the genloom pipeline

use thiserror::Error;

/// Unified error type for all genloom operations
#[derive(Error, Debug)]
pub enum LoomError {
    // Transport errors
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // Stream outcome errors
    #[error("Upstream rejected the request: {0}")]
    UpstreamRejection(String),

    #[error("Stream ended with no content")]
    EmptyResponse,

    // Recovery errors
    #[error("No records could be recovered from response text")]
    MalformedPayload {
        /// The original accumulated text, kept for diagnostic surfacing
        raw: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    // Consumer errors
    #[error("Downstream consumer disconnected")]
    Cancelled,

    // Budget exhaustion
    #[error("Failed after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: usize,
        #[source]
        source: Box<LoomError>,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using LoomError
pub type Result<T> = std::result::Result<T, LoomError>;

/// Whether a failed attempt should be retried or surfaced immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

/// Default retry classification, shared by the streaming and non-streaming
/// paths. Callers may substitute their own classifier.
///
/// Transient transport failures and empty/unparseable responses are worth
/// another attempt; safety blocks, malformed requests, and validation
/// failures are not.
pub fn default_retry_class(err: &LoomError) -> RetryClass {
    match err {
        LoomError::Connection(_)
        | LoomError::Upstream(_)
        | LoomError::EmptyResponse
        | LoomError::MalformedPayload { .. } => RetryClass::Retryable,

        LoomError::UpstreamRejection(_)
        | LoomError::BadRequest(_)
        | LoomError::ValidationFailed(_)
        | LoomError::Cancelled
        | LoomError::ExhaustedRetries { .. } => RetryClass::Terminal,

        LoomError::Io(_) | LoomError::Serialization(_) | LoomError::Other(_) => {
            RetryClass::Terminal
        }
    }
}

impl LoomError {
    /// Human-readable summary of likely causes, shown when retries are
    /// exhausted
    pub fn likely_causes(&self) -> &'static str {
        match self {
            LoomError::ExhaustedRetries { source, .. } => source.likely_causes(),
            LoomError::EmptyResponse | LoomError::MalformedPayload { .. } => {
                "This might be due to API rate limits or quota, content safety \
                 filters, or network issues. Please try again in a few moments."
            }
            LoomError::Connection(_) => {
                "Please check your network connection and try again."
            }
            _ => "Please try again in a few moments.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert_eq!(
            default_retry_class(&LoomError::Connection("reset".into())),
            RetryClass::Retryable
        );
        assert_eq!(
            default_retry_class(&LoomError::EmptyResponse),
            RetryClass::Retryable
        );
        assert_eq!(
            default_retry_class(&LoomError::MalformedPayload { raw: "x".into() }),
            RetryClass::Retryable
        );
    }

    #[test]
    fn test_safety_block_is_terminal() {
        assert_eq!(
            default_retry_class(&LoomError::UpstreamRejection("blocked".into())),
            RetryClass::Terminal
        );
    }

    #[test]
    fn test_exhausted_retries_carries_source() {
        let err = LoomError::ExhaustedRetries {
            attempts: 3,
            source: Box::new(LoomError::EmptyResponse),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("no content"));
    }
}

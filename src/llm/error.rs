//! Model endpoint error types

use thiserror::Error;

/// Endpoint error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classifies a non-success HTTP status, carrying the diagnostic body.
    pub fn http(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => LlmErrorKind::Auth,
            429 => LlmErrorKind::RateLimit,
            400..=499 => LlmErrorKind::InvalidRequest,
            500..=599 => LlmErrorKind::ServerError,
            _ => LlmErrorKind::Unknown,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }
}

/// Error classification for callers that wrap retries around invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Bad request (4xx) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl LlmErrorKind {
    #[allow(dead_code)] // For callers that wrap retries around invocations
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(LlmError::http(401, "nope").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::http(429, "slow").kind, LlmErrorKind::RateLimit);
        assert_eq!(
            LlmError::http(400, "bad").kind,
            LlmErrorKind::InvalidRequest
        );
        assert_eq!(LlmError::http(502, "oof").kind, LlmErrorKind::ServerError);
    }

    #[test]
    fn diagnostic_body_is_preserved() {
        let err = LlmError::http(500, "{\"error\":\"overloaded\"}");
        assert!(err.to_string().contains("overloaded"));
        assert!(err.kind.is_retryable());
    }
}

//! Error types for the grading pipeline.
//!
//! `ProviderError` lives here rather than in `saiten-providers` so that
//! transport wrappers can downcast an `anyhow::Error` and classify it for
//! retry decisions without string matching.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to the caller of a grading request.
///
/// Rule failures and malformed model output are recovered inside the
/// pipeline and never show up here.
#[derive(Debug, Error)]
pub enum GradingError {
    /// A required problem or answer field is missing or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but has an unusable value.
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    /// The model call did not finish within the configured timeout.
    #[error("model call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The model transport failed.
    #[error("model transport failed: {0:#}")]
    Transport(anyhow::Error),
}

impl GradingError {
    /// Returns `true` for errors caused by bad caller input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            GradingError::MissingField(_) | GradingError::InvalidField { .. }
        )
    }
}

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// A failure inside a single rule check.
///
/// The evaluator records it on that rule's detail entry and moves on.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("character limit must be positive, got {0}")]
    InvalidCharLimit(u32),

    #[error("{0}")]
    Check(String),
}

//! Provider failure classification.
//!
//! A missing datum is never fatal at the cycle level: callers drop the
//! affected market or asset family and continue. The classification only
//! decides whether a retry is worth anything.

use thiserror::Error;

/// Errors from market-data providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Timeout, 5xx, DNS failure, rate limit. Retried with backoff.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// A 4xx that will not fix itself. Not retried.
    #[error("permanent provider error (status {status_code}): {message}")]
    Permanent { status_code: u16, message: String },

    /// Response arrived but could not be interpreted.
    #[error("malformed provider response: {0}")]
    Parse(String),

    /// Every configured source failed for this datum.
    #[error("all sources exhausted: {0}")]
    Exhausted(String),
}

impl ProviderError {
    pub fn permanent(status_code: u16, message: impl Into<String>) -> Self {
        Self::Permanent {
            status_code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

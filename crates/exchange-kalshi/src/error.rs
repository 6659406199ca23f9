//! Error types for the Kalshi venue client.

use thiserror::Error;

/// Errors from venue operations.
#[derive(Error, Debug)]
pub enum KalshiError {
    /// Missing or unusable credentials / client setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// The venue answered with a non-success status.
    #[error("API error (status {status_code}): {message}")]
    Api { status_code: u16, message: String },

    /// 429 from the venue; the whole cycle should cool off.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// Transport-level failure (DNS, TLS, connect).
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The venue rejected an order.
    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    /// Requested market does not exist.
    #[error("market not found: {ticker}")]
    MarketNotFound { ticker: String },

    /// A ticker or identifier failed validation before any request.
    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KalshiError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    pub fn order_rejected(reason: impl Into<String>) -> Self {
        Self::OrderRejected {
            reason: reason.into(),
        }
    }

    pub fn market_not_found(ticker: impl Into<String>) -> Self {
        Self::MarketNotFound {
            ticker: ticker.into(),
        }
    }

    /// True for failures worth retrying with backoff: transport errors,
    /// timeouts, 5xx, and 429.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Suggested delay before the next attempt, seconds.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_secs } => Some(*retry_after_secs),
            Self::Network(_) | Self::Timeout(_) => Some(2),
            Self::Api { status_code, .. } if *status_code >= 500 => Some(5),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for KalshiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for KalshiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for venue operations.
pub type Result<T> = std::result::Result<T, KalshiError>;

//! Optional news sentiment feed.
//!
//! Entirely additive: without a token in the environment the factory
//! returns `None` and every snapshot simply carries no sentiment. The
//! edge bonus it feeds is small and the rest of the pipeline never
//! depends on it.

use autotrader_core::types::Asset;
use autotrader_data::error::ProviderError;
use autotrader_data::http::HttpGetter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable holding the sentiment API token.
pub const NEWS_TOKEN_ENV: &str = "NEWS_API_TOKEN";

const DEFAULT_BASE_URL: &str = "https://api.newssignal.example.com";

/// Aggregate sentiment for one asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewsSentiment {
    /// In [-1, 1]; positive is bullish.
    pub sentiment: f64,
    /// In [0, 1]; how much coverage backs the score.
    pub confidence: f64,
}

impl NewsSentiment {
    /// Signed probability bonus toward YES, clamped to +/-0.01 and
    /// discarded when coverage is thin.
    #[must_use]
    pub fn yes_prob_bonus(&self) -> f64 {
        if self.confidence < 0.3 {
            return 0.0;
        }
        (self.sentiment * self.confidence * 0.02).clamp(-0.01, 0.01)
    }
}

#[derive(Debug, Clone)]
pub struct NewsClient {
    http: HttpGetter,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    sentiment: f64,
    confidence: f64,
}

impl NewsClient {
    /// Builds a client only when `NEWS_API_TOKEN` is set.
    #[must_use]
    pub fn from_env(http: HttpGetter) -> Option<Self> {
        let token = std::env::var(NEWS_TOKEN_ENV).ok().filter(|t| !t.is_empty())?;
        Some(Self::new(http, DEFAULT_BASE_URL, token))
    }

    #[must_use]
    pub fn new(http: HttpGetter, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Fetches sentiment for one asset. Failures degrade to `None` at
    /// the call site; sentiment is never load-bearing.
    ///
    /// # Errors
    ///
    /// Returns a provider error when the feed is unreachable or replies
    /// with malformed data.
    pub async fn sentiment(&self, asset: Asset) -> Result<NewsSentiment, ProviderError> {
        let url = format!(
            "{}/api/v1/sentiment?symbol={}&auth_token={}",
            self.base_url,
            asset.symbol(),
            self.token
        );
        let raw: RawSentiment = self.http.get_json(&url).await?;
        if !(-1.0..=1.0).contains(&raw.sentiment) || !(0.0..=1.0).contains(&raw.confidence) {
            return Err(ProviderError::Parse(format!(
                "sentiment out of range: sentiment={} confidence={}",
                raw.sentiment, raw.confidence
            )));
        }
        debug!(asset = %asset.symbol(), sentiment = raw.sentiment, "news sentiment");
        Ok(NewsSentiment {
            sentiment: raw.sentiment,
            confidence: raw.confidence,
        })
    }
}

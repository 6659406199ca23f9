//! Historical settlement reference prices.
//!
//! Used only by the settlement resolver. Two independent sources are
//! consulted: CryptoCompare hourly history as primary and CoinGecko's
//! range endpoint as a cross-check. When both answer and agree within a
//! tight tolerance the primary value is used; a disagreement or a
//! single-source answer is accepted with a logged warning rather than
//! leaving trades pending forever.

use crate::error::{ProviderError, Result};
use crate::http::HttpGetter;
use autotrader_core::types::Asset;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Relative disagreement between sources that triggers a warning.
const AGREE_TOLERANCE: f64 = 0.005;

/// Source endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct HistorySources {
    pub cryptocompare_base: String,
    pub coingecko_base: String,
}

impl Default for HistorySources {
    fn default() -> Self {
        Self {
            cryptocompare_base: "https://min-api.cryptocompare.com".to_string(),
            coingecko_base: "https://api.coingecko.com".to_string(),
        }
    }
}

/// Historical price provider for settlement references.
#[derive(Debug, Clone)]
pub struct HistoryProvider {
    http: HttpGetter,
    sources: HistorySources,
}

#[derive(Debug, Deserialize)]
struct CcHistoResponse {
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Data")]
    data: Option<CcHistoData>,
}

#[derive(Debug, Deserialize)]
struct CcHistoData {
    #[serde(rename = "Data")]
    data: Vec<CcCandle>,
}

#[derive(Debug, Deserialize)]
struct CcCandle {
    close: f64,
}

#[derive(Debug, Deserialize)]
struct GeckoRange {
    /// `[ms_timestamp, price]` pairs.
    prices: Vec<(f64, f64)>,
}

impl HistoryProvider {
    #[must_use]
    pub fn new(http: HttpGetter, sources: HistorySources) -> Self {
        Self { http, sources }
    }

    /// Price in USD at (the hourly candle covering) `instant`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Exhausted`] when neither source can
    /// supply a price; the caller leaves the trade pending for retry.
    pub async fn price_at(&self, asset: Asset, instant: DateTime<Utc>) -> Result<f64> {
        let (primary, secondary) = tokio::join!(
            self.cryptocompare(asset, instant),
            self.coingecko(asset, instant)
        );

        match (primary, secondary) {
            (Ok(p), Ok(s)) => {
                let diff = (p - s).abs() / p.max(f64::MIN_POSITIVE);
                if diff > AGREE_TOLERANCE {
                    warn!(
                        asset = %asset,
                        at = %instant,
                        primary = p,
                        secondary = s,
                        diff_pct = diff * 100.0,
                        "reference price sources disagree, using primary"
                    );
                }
                Ok(p)
            }
            (Ok(p), Err(e)) => {
                warn!(asset = %asset, at = %instant, error = %e,
                      "single-source reference price (cross-check failed)");
                Ok(p)
            }
            (Err(e), Ok(s)) => {
                warn!(asset = %asset, at = %instant, error = %e,
                      "single-source reference price (primary failed)");
                Ok(s)
            }
            (Err(p_err), Err(s_err)) => Err(ProviderError::Exhausted(format!(
                "price_at {asset} @ {instant}: {p_err}; {s_err}"
            ))),
        }
    }

    async fn cryptocompare(&self, asset: Asset, instant: DateTime<Utc>) -> Result<f64> {
        let url = format!(
            "{}/data/v2/histohour?fsym={}&tsym=USD&limit=1&toTs={}",
            self.sources.cryptocompare_base,
            asset.symbol(),
            instant.timestamp()
        );
        let response: CcHistoResponse = self.http.get_json(&url).await?;
        if response.response.as_deref() != Some("Success") {
            return Err(ProviderError::Parse(
                "cryptocompare non-success response".to_string(),
            ));
        }
        response
            .data
            .and_then(|d| d.data.last().map(|c| c.close))
            .filter(|close| *close > 0.0)
            .ok_or_else(|| ProviderError::Parse("cryptocompare empty candles".to_string()))
    }

    async fn coingecko(&self, asset: Asset, instant: DateTime<Utc>) -> Result<f64> {
        let ts = instant.timestamp();
        let url = format!(
            "{}/api/v3/coins/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.sources.coingecko_base,
            asset.coingecko_id(),
            ts - 3_600,
            ts + 3_600
        );
        let range: GeckoRange = self.http.get_json(&url).await?;
        range
            .prices
            .iter()
            .min_by(|a, b| {
                let da = (a.0 / 1000.0 - ts as f64).abs();
                let db = (b.0 / 1000.0 - ts as f64).abs();
                da.total_cmp(&db)
            })
            .map(|(_, price)| *price)
            .ok_or_else(|| ProviderError::Parse("coingecko empty range".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str) -> HistoryProvider {
        let base = server_uri.to_string();
        HistoryProvider::new(
            HttpGetter::new(6000, 5, 1).unwrap(),
            HistorySources {
                cryptocompare_base: base.clone(),
                coingecko_base: base,
            },
        )
    }

    fn cc_body(close: f64) -> serde_json::Value {
        serde_json::json!({
            "Response": "Success",
            "Data": {"Data": [{"time": 1, "close": close}]}
        })
    }

    #[tokio::test]
    async fn agreeing_sources_return_primary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v2/histohour"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cc_body(67_850.0)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin/market_chart/range"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prices": [[1_760_000_100_000.0, 67_900.0], [1_760_000_000_000.0, 67_860.0]]
            })))
            .mount(&server)
            .await;

        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let price = provider_for(&server.uri())
            .price_at(Asset::Btc, at)
            .await
            .unwrap();
        assert_eq!(price, 67_850.0);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_when_primary_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v2/histohour"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/ethereum/market_chart/range"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prices": [[1_760_000_000_000.0, 3_210.5]]
            })))
            .mount(&server)
            .await;

        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let price = provider_for(&server.uri())
            .price_at(Asset::Eth, at)
            .await
            .unwrap();
        assert_eq!(price, 3_210.5);
    }

    #[tokio::test]
    async fn both_sources_down_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let err = provider_for(&server.uri())
            .price_at(Asset::Btc, at)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(_)));
    }

    #[tokio::test]
    async fn cryptocompare_error_payload_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v2/histohour"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Response": "Error", "Message": "limit exceeded"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin/market_chart/range"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prices": [[1_760_000_000_000.0, 68_000.0]]
            })))
            .mount(&server)
            .await;

        // Primary unusable, secondary carries the answer.
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let price = provider_for(&server.uri())
            .price_at(Asset::Btc, at)
            .await
            .unwrap();
        assert_eq!(price, 68_000.0);
    }
}

//! Per-asset signal assembly.
//!
//! One [`SignalEngine`] lives for the whole session: it owns the data
//! providers plus the regime trackers that carry hysteresis state from
//! cycle to cycle, and hands the opportunity finder a self-contained
//! [`SignalSnapshot`] per crypto asset (or [`WeatherSnapshot`] per city
//! market).

use std::collections::HashMap;

use autotrader_core::policy::PolicyParams;
use autotrader_core::types::{Asset, Candle, WeatherKind};
use autotrader_data::error::{ProviderError, Result};
use autotrader_data::{OhlcProvider, SpotProvider, WeatherProvider};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::correlation::{crypto_correlation, CorrelationReading};
use crate::momentum::{momentum, Momentum};
use crate::news::{NewsClient, NewsSentiment};
use crate::regime::{RegimeReading, RegimeTracker};
use crate::volatility::{vol_reading, VolReading};

/// Everything the finder needs to evaluate one crypto asset's markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub asset: Asset,
    pub spot: f64,
    pub vol: VolReading,
    pub momentum: Momentum,
    pub regime: RegimeReading,
    pub news: Option<NewsSentiment>,
    /// Trailing hourly candles the readings were derived from. Kept so
    /// the cross-asset correlation can reuse them.
    pub candles: Vec<Candle>,
}

/// Forecast inputs for one weather market's evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub city: String,
    pub date: NaiveDate,
    pub kind: WeatherKind,
    pub forecast_f: f64,
    pub uncertainty_f: f64,
}

pub struct SignalEngine {
    spot: SpotProvider,
    ohlc: OhlcProvider,
    weather: WeatherProvider,
    news: Option<NewsClient>,
    trackers: HashMap<Asset, RegimeTracker>,
}

impl SignalEngine {
    #[must_use]
    pub fn new(
        spot: SpotProvider,
        ohlc: OhlcProvider,
        weather: WeatherProvider,
        news: Option<NewsClient>,
    ) -> Self {
        Self {
            spot,
            ohlc,
            weather,
            news,
            trackers: HashMap::new(),
        }
    }

    /// Builds the snapshot for one crypto asset. Sentiment failures are
    /// logged and dropped; spot or candle failures propagate, since the
    /// caller must skip the asset this cycle.
    ///
    /// # Errors
    ///
    /// Returns a provider error when the spot price or candle history
    /// cannot be fetched.
    pub async fn crypto_snapshot(
        &mut self,
        asset: Asset,
        policy: &PolicyParams,
    ) -> Result<SignalSnapshot> {
        // 25 hours covers the longest momentum window plus its anchor.
        let hours = policy.vol.window_hours.max(25);
        let (spot, candles) = tokio::join!(self.spot.spot(asset), self.ohlc.ohlc(asset, hours));
        let spot = spot?;
        let candles = candles?;
        if candles.is_empty() {
            return Err(ProviderError::Exhausted(format!(
                "no candles for {}",
                asset.symbol()
            )));
        }

        let vol = vol_reading(
            &candles,
            policy.default_hourly_vol(asset),
            policy.vol.floor,
            policy.vol.ceiling,
        );
        let m = momentum(&candles);
        let regime = self
            .trackers
            .entry(asset)
            .or_default()
            .observe(&candles, &m);

        let news = match &self.news {
            Some(client) => match client.sentiment(asset).await {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(asset = %asset.symbol(), error = %e, "news sentiment unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(SignalSnapshot {
            asset,
            spot,
            vol,
            momentum: m,
            regime,
            news,
            candles,
        })
    }

    /// Forecast snapshot for one weather market.
    ///
    /// # Errors
    ///
    /// Returns a provider error for unknown cities or when the forecast
    /// horizon does not cover `date`.
    pub async fn weather_snapshot(
        &self,
        city: &str,
        date: NaiveDate,
        kind: WeatherKind,
    ) -> Result<WeatherSnapshot> {
        let (forecast_f, uncertainty_f) = self.weather.forecast_temperature(city, date, kind).await?;
        Ok(WeatherSnapshot {
            city: city.to_string(),
            date,
            kind,
            forecast_f,
            uncertainty_f,
        })
    }
}

/// Cross-asset correlation from two already-built snapshots.
#[must_use]
pub fn snapshot_correlation(btc: &SignalSnapshot, eth: &SignalSnapshot) -> CorrelationReading {
    crypto_correlation(&btc.candles, &eth.candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrader_data::{HttpGetter, OhlcSources, SpotSources, WeatherSources};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn klines_body(n: usize) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                let close = 68000.0 + i as f64 * 50.0;
                serde_json::json!([
                    1_706_400_000_000i64 + i as i64 * 3_600_000,
                    format!("{close}"),
                    format!("{}", close * 1.002),
                    format!("{}", close * 0.998),
                    format!("{close}"),
                    "12.5",
                    0, "0", 0, "0", "0", "0"
                ])
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    async fn engine_against(server: &MockServer, cache: &TempDir) -> SignalEngine {
        let http = || HttpGetter::new(600, 5, 1).unwrap();
        let spot = SpotProvider::new(
            http(),
            SpotSources {
                binance_base: server.uri(),
                coinbase_base: server.uri(),
                coingecko_base: server.uri(),
            },
        );
        let ohlc = OhlcProvider::new(
            http(),
            OhlcSources {
                binance_base: server.uri(),
                coingecko_base: server.uri(),
            },
            cache.path().to_path_buf(),
        );
        let weather = WeatherProvider::new(
            http(),
            WeatherSources {
                nws_base: server.uri(),
                open_meteo_base: server.uri(),
            },
            3.0,
        );
        SignalEngine::new(spot, ohlc, weather, None)
    }

    #[tokio::test]
    async fn crypto_snapshot_assembles_all_readings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "BTCUSDT", "price": "69450.00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/BTC-USD/spot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"amount": "69455.00", "base": "BTC", "currency": "USD"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bitcoin": {"usd": 69448.0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(klines_body(30)))
            .mount(&server)
            .await;

        let cache = TempDir::new().unwrap();
        let mut engine = engine_against(&server, &cache).await;
        let policy = PolicyParams::default();
        let snap = engine.crypto_snapshot(Asset::Btc, &policy).await.unwrap();

        assert!((snap.spot - 69450.0).abs() < 1.0, "median spot, got {}", snap.spot);
        assert_eq!(snap.candles.len(), 30);
        assert!(snap.momentum.composite > 0.0, "steady rise reads bullish");
        assert!(snap.vol.realized_hourly >= policy.vol.floor);
        assert!(snap.news.is_none());
    }

    #[tokio::test]
    async fn snapshot_fails_when_candles_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "ETHUSDT", "price": "3500.00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/prices/ETH-USD/spot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"amount": "3501.00", "base": "ETH", "currency": "USD"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ethereum": {"usd": 3499.0}
            })))
            .mount(&server)
            .await;
        // Both candle sources down, no cache seeded.
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/ethereum/ohlc"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = TempDir::new().unwrap();
        let mut engine = engine_against(&server, &cache).await;
        let policy = PolicyParams::default();
        let err = engine
            .crypto_snapshot(Asset::Eth, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(_)));
    }
}

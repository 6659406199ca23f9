//! Hourly OHLC candles with a disk cache.
//!
//! Primary source is Binance klines; CoinGecko's OHLC endpoint is the
//! fallback (no volume there, so volume reads as zero). Results are
//! cached on disk keyed by (asset, endpoint hour) so repeated calls
//! within the hour cost no network I/O, and a stale cache is served with
//! a warning when every source is down, so signals degrade gracefully
//! instead of dropping the asset outright.

use crate::error::{ProviderError, Result};
use crate::http::HttpGetter;
use autotrader_core::types::{Asset, Candle};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct OhlcSources {
    pub binance_base: String,
    pub coingecko_base: String,
}

impl Default for OhlcSources {
    fn default() -> Self {
        Self {
            binance_base: "https://api.binance.com".to_string(),
            coingecko_base: "https://api.coingecko.com".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedCandles {
    /// UTC hour the data was fetched in, `YYYY-MM-DD-HH`.
    fetched_hour: String,
    fetched_at: DateTime<Utc>,
    candles: Vec<Candle>,
}

/// Hourly candle provider with per-(asset, hour) disk caching.
#[derive(Debug, Clone)]
pub struct OhlcProvider {
    http: HttpGetter,
    sources: OhlcSources,
    cache_dir: PathBuf,
}

fn hour_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d-%H").to_string()
}

impl OhlcProvider {
    #[must_use]
    pub fn new(http: HttpGetter, sources: OhlcSources, cache_dir: PathBuf) -> Self {
        Self {
            http,
            sources,
            cache_dir,
        }
    }

    fn cache_path(&self, asset: Asset, hours: usize) -> PathBuf {
        self.cache_dir
            .join(format!("{}-{}h.json", asset.symbol().to_lowercase(), hours))
    }

    /// Returns the most recent `hours` hourly candles, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Exhausted`] only when every source fails
    /// and no cached copy of any age exists.
    pub async fn ohlc(&self, asset: Asset, hours: usize) -> Result<Vec<Candle>> {
        let path = self.cache_path(asset, hours);
        let now_key = hour_key(Utc::now());

        if let Some(cached) = self.load_cache(&path) {
            if cached.fetched_hour == now_key {
                debug!(asset = %asset, hours, "serving candles from fresh cache");
                return Ok(cached.candles);
            }
        }

        let fetched = match self.binance_klines(asset, hours).await {
            Ok(candles) => Ok(candles),
            Err(primary_err) => {
                debug!(asset = %asset, error = %primary_err, "primary candle source failed");
                self.coingecko_ohlc(asset, hours).await
            }
        };

        match fetched {
            Ok(candles) => {
                self.store_cache(&path, &now_key, &candles);
                Ok(candles)
            }
            Err(e) => {
                if let Some(stale) = self.load_cache(&path) {
                    warn!(
                        asset = %asset,
                        fetched_at = %stale.fetched_at,
                        error = %e,
                        "all candle sources down, serving stale cache"
                    );
                    return Ok(stale.candles);
                }
                Err(ProviderError::Exhausted(format!("ohlc {asset}: {e}")))
            }
        }
    }

    fn load_cache(&self, path: &Path) -> Option<CachedCandles> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt candle cache");
                None
            }
        }
    }

    fn store_cache(&self, path: &Path, hour: &str, candles: &[Candle]) {
        let doc = CachedCandles {
            fetched_hour: hour.to_string(),
            fetched_at: Utc::now(),
            candles: candles.to_vec(),
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, serde_json::to_string(&doc).unwrap_or_default())?;
            fs::rename(&tmp, path)
        };
        if let Err(e) = write() {
            // Cache trouble must not fail the fetch.
            warn!(path = %path.display(), error = %e, "failed to write candle cache");
        }
    }

    async fn binance_klines(&self, asset: Asset, hours: usize) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}USDT&interval=1h&limit={}",
            self.sources.binance_base,
            asset.symbol(),
            hours.min(1000)
        );
        let rows: Vec<Vec<serde_json::Value>> = self.http.get_json(&url).await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_binance_row(&row)?);
        }
        Ok(candles)
    }

    async fn coingecko_ohlc(&self, asset: Asset, hours: usize) -> Result<Vec<Candle>> {
        let days = hours.div_ceil(24).max(1);
        let url = format!(
            "{}/api/v3/coins/{}/ohlc?vs_currency=usd&days={}",
            self.sources.coingecko_base,
            asset.coingecko_id(),
            days
        );
        let rows: Vec<Vec<f64>> = self.http.get_json(&url).await?;

        let mut candles: Vec<Candle> = rows
            .iter()
            .filter(|row| row.len() >= 5)
            .map(|row| Candle {
                open_time: Utc
                    .timestamp_millis_opt(row[0] as i64)
                    .single()
                    .unwrap_or_else(Utc::now),
                open: row[1],
                high: row[2],
                low: row[3],
                close: row[4],
                volume: 0.0,
            })
            .collect();
        if candles.is_empty() {
            return Err(ProviderError::Parse("empty coingecko ohlc".to_string()));
        }
        let keep = candles.len().saturating_sub(hours);
        candles.drain(..keep);
        Ok(candles)
    }
}

fn parse_binance_row(row: &[serde_json::Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(ProviderError::Parse(format!(
            "binance kline with {} fields",
            row.len()
        )));
    }
    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| ProviderError::Parse("kline open time".to_string()))?;
    let field = |i: usize, name: &str| -> Result<f64> {
        row[i]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::Parse(format!("kline {name}")))
    };
    Ok(Candle {
        open_time: Utc
            .timestamp_millis_opt(open_time_ms)
            .single()
            .ok_or_else(|| ProviderError::Parse("kline timestamp range".to_string()))?,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server_uri: &str, cache_dir: &Path) -> OhlcProvider {
        let base = server_uri.to_string();
        OhlcProvider::new(
            HttpGetter::new(6000, 5, 1).unwrap(),
            OhlcSources {
                binance_base: base.clone(),
                coingecko_base: base,
            },
            cache_dir.to_path_buf(),
        )
    }

    fn binance_body(n: usize) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                serde_json::json!([
                    1_760_000_000_000i64 + (i as i64) * 3_600_000,
                    "68000.0", "68200.0", "67900.0", "68100.0", "12.5",
                    0, "0", 0, "0", "0", "0"
                ])
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    #[test]
    fn binance_row_parsing() {
        let row: Vec<serde_json::Value> = serde_json::from_value(serde_json::json!([
            1_760_000_000_000i64, "68000.0", "68200.0", "67900.0", "68100.0", "12.5"
        ]))
        .unwrap();
        let candle = parse_binance_row(&row).unwrap();
        assert_eq!(candle.open, 68_000.0);
        assert_eq!(candle.close, 68_100.0);
        assert_eq!(candle.volume, 12.5);

        let short: Vec<serde_json::Value> = vec![serde_json::json!(1)];
        assert!(parse_binance_row(&short).is_err());
    }

    #[tokio::test]
    async fn fetch_writes_cache_and_second_call_skips_network() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(binance_body(24)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri(), dir.path());
        let first = provider.ohlc(Asset::Btc, 24).await.unwrap();
        assert_eq!(first.len(), 24);
        // Within the same hour the cache answers; expect(1) enforces it.
        let second = provider.ohlc(Asset::Btc, 24).await.unwrap();
        assert_eq!(second.len(), 24);
    }

    #[tokio::test]
    async fn falls_through_to_coingecko() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/ethereum/ohlc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [1_760_000_000_000i64, 3200.0, 3210.0, 3195.0, 3205.0],
                [1_760_003_600_000i64, 3205.0, 3220.0, 3200.0, 3215.0]
            ])))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri(), dir.path());
        let candles = provider.ohlc(Asset::Eth, 24).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 3_215.0);
        assert_eq!(candles[1].volume, 0.0);
    }

    #[tokio::test]
    async fn serves_stale_cache_when_everything_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri(), dir.path());
        // Seed a cache from a past hour.
        let path = provider.cache_path(Asset::Btc, 24);
        fs::create_dir_all(dir.path()).unwrap();
        let stale = CachedCandles {
            fetched_hour: "2026-01-01-00".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap(),
            candles: vec![Candle {
                open_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 3.0,
            }],
        };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let candles = provider.ohlc(Asset::Btc, 24).await.unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 1.5);
    }

    #[tokio::test]
    async fn no_cache_and_no_sources_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider_for(&server.uri(), dir.path());
        let err = provider.ohlc(Asset::Btc, 24).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted(_)));
    }
}

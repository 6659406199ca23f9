//! Spot prices from three independent sources, combined by median.
//!
//! Any single healthy source is enough to trade; the median shields the
//! pricer from one venue printing a bad tick. A spread above half a
//! percent between the highest and lowest quote is logged because it
//! usually means one source is stale.

use crate::error::{ProviderError, Result};
use crate::http::HttpGetter;
use autotrader_core::types::Asset;
use serde::Deserialize;
use tracing::{debug, warn};

/// Max/min spread across sources that triggers a warning, fraction.
const SPREAD_WARN: f64 = 0.005;

/// Source endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct SpotSources {
    pub binance_base: String,
    pub coinbase_base: String,
    pub coingecko_base: String,
}

impl Default for SpotSources {
    fn default() -> Self {
        Self {
            binance_base: "https://api.binance.com".to_string(),
            coinbase_base: "https://api.coinbase.com".to_string(),
            coingecko_base: "https://api.coingecko.com".to_string(),
        }
    }
}

/// Multi-source spot price provider.
#[derive(Debug, Clone)]
pub struct SpotProvider {
    http: HttpGetter,
    sources: SpotSources,
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct CoinbaseSpot {
    data: CoinbaseSpotData,
}

#[derive(Debug, Deserialize)]
struct CoinbaseSpotData {
    amount: String,
}

impl SpotProvider {
    #[must_use]
    pub fn new(http: HttpGetter, sources: SpotSources) -> Self {
        Self { http, sources }
    }

    /// Current spot price in USD, the median of every source that
    /// answered.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Exhausted`] when no source answered;
    /// callers treat that as "disable this asset for the cycle".
    pub async fn spot(&self, asset: Asset) -> Result<f64> {
        let (binance, coinbase, coingecko) = tokio::join!(
            self.binance(asset),
            self.coinbase(asset),
            self.coingecko(asset)
        );

        let mut quotes: Vec<f64> = Vec::with_capacity(3);
        for (name, quote) in [
            ("binance", binance),
            ("coinbase", coinbase),
            ("coingecko", coingecko),
        ] {
            match quote {
                Ok(price) if price > 0.0 => quotes.push(price),
                Ok(price) => debug!(source = name, price, "ignoring non-positive quote"),
                Err(e) => debug!(source = name, asset = %asset, error = %e, "spot source failed"),
            }
        }

        if quotes.is_empty() {
            return Err(ProviderError::Exhausted(format!("spot {asset}")));
        }

        quotes.sort_by(|a, b| a.total_cmp(b));
        let spread = (quotes[quotes.len() - 1] - quotes[0]) / quotes[0];
        if quotes.len() > 1 && spread > SPREAD_WARN {
            warn!(
                asset = %asset,
                low = quotes[0],
                high = quotes[quotes.len() - 1],
                spread_pct = spread * 100.0,
                "wide spread across spot sources"
            );
        }

        Ok(median_of_sorted(&quotes))
    }

    async fn binance(&self, asset: Asset) -> Result<f64> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}USDT",
            self.sources.binance_base,
            asset.symbol()
        );
        let ticker: BinanceTicker = self.http.get_json(&url).await?;
        ticker
            .price
            .parse()
            .map_err(|_| ProviderError::Parse(format!("binance price: {}", ticker.price)))
    }

    async fn coinbase(&self, asset: Asset) -> Result<f64> {
        let url = format!(
            "{}/v2/prices/{}-USD/spot",
            self.sources.coinbase_base,
            asset.symbol()
        );
        let spot: CoinbaseSpot = self.http.get_json(&url).await?;
        spot.data
            .amount
            .parse()
            .map_err(|_| ProviderError::Parse(format!("coinbase amount: {}", spot.data.amount)))
    }

    async fn coingecko(&self, asset: Asset) -> Result<f64> {
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.sources.coingecko_base,
            asset.coingecko_id()
        );
        let value: serde_json::Value = self.http.get_json(&url).await?;
        value[asset.coingecko_id()]["usd"]
            .as_f64()
            .ok_or_else(|| ProviderError::Parse("coingecko simple price shape".to_string()))
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

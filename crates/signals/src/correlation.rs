//! BTC/ETH return correlation over the trailing week.
//!
//! When the two crypto assets move in lockstep the group exposure cap
//! tightens, since nominally separate positions share one risk factor.

use autotrader_core::types::Candle;
use serde::{Deserialize, Serialize};

/// Correlation above this collapses the crypto group cap to its tight
/// setting.
pub const HIGH_CORRELATION: f64 = 0.9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationReading {
    /// Pearson coefficient of paired hourly log returns, or `None` when
    /// fewer than 24 pairs were available.
    pub rho: Option<f64>,
    pub sample_pairs: usize,
}

impl CorrelationReading {
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.rho.is_some_and(|r| r >= HIGH_CORRELATION)
    }
}

fn log_returns(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .filter(|w| w[0].close > 0.0 && w[1].close > 0.0)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect()
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Correlates the trailing hourly candles of the two assets. Pairs are
/// aligned from the most recent end; a reading needs at least 24 pairs.
#[must_use]
pub fn crypto_correlation(btc: &[Candle], eth: &[Candle]) -> CorrelationReading {
    let ra = log_returns(btc);
    let rb = log_returns(eth);
    let pairs = ra.len().min(rb.len());
    if pairs < 24 {
        return CorrelationReading {
            rho: None,
            sample_pairs: pairs,
        };
    }
    CorrelationReading {
        rho: pearson(&ra, &rb),
        sample_pairs: pairs,
    }
}

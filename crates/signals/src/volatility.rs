//! Realized volatility from hourly candles.

use autotrader_core::types::{Candle, Side};
use serde::{Deserialize, Serialize};

/// Coarse volatility class from the average hourly high-low range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolClass {
    VeryLow,
    Low,
    Normal,
    High,
    VeryHigh,
}

impl VolClass {
    #[must_use]
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }
}

/// Realized-vs-assumed volatility comparison for one asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolReading {
    /// Stdev of hourly log returns over the window.
    pub realized_hourly: f64,
    /// The model's assumed hourly volatility.
    pub assumed_hourly: f64,
    /// realized / assumed.
    pub ratio: f64,
    pub class: VolClass,
}

impl VolReading {
    /// Side favored by the volatility mismatch: elevated realized vol
    /// favors YES on out-of-the-money strikes (more chance to cross),
    /// suppressed vol favors NO.
    #[must_use]
    pub fn advantage_side(&self) -> Option<Side> {
        if self.ratio > 1.15 {
            Some(Side::Yes)
        } else if self.ratio < 0.85 {
            Some(Side::No)
        } else {
            None
        }
    }

    /// True when `side` is the advantaged side.
    #[must_use]
    pub fn aligned_with(&self, side: Side) -> bool {
        self.advantage_side() == Some(side)
    }

    /// Additive edge adjustment for `side`, bounded to ±0.02.
    #[must_use]
    pub fn edge_bonus(&self, side: Side) -> f64 {
        let raw = (self.ratio - 1.0) * 0.1;
        let bonus = raw.clamp(-0.02, 0.02);
        match (self.advantage_side(), side) {
            (Some(adv), s) if adv == s => bonus.abs(),
            (Some(_), _) => -bonus.abs(),
            (None, _) => 0.0,
        }
    }
}

/// Sample standard deviation of hourly log returns, `None` when fewer
/// than three candles are available.
#[must_use]
pub fn realized_hourly_vol(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 3 {
        return None;
    }
    let returns: Vec<f64> = candles
        .windows(2)
        .filter(|w| w[0].close > 0.0 && w[1].close > 0.0)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;
    Some(var.sqrt())
}

/// Classifies volatility from the average hourly high-low range as a
/// fraction of the close.
#[must_use]
pub fn vol_class(candles: &[Candle]) -> VolClass {
    let ranges: Vec<f64> = candles
        .iter()
        .filter(|c| c.close > 0.0)
        .map(|c| (c.high - c.low) / c.close)
        .collect();
    if ranges.is_empty() {
        return VolClass::Normal;
    }
    let avg = ranges.iter().sum::<f64>() / ranges.len() as f64;
    if avg < 0.003 {
        VolClass::VeryLow
    } else if avg < 0.005 {
        VolClass::Low
    } else if avg < 0.01 {
        VolClass::Normal
    } else if avg < 0.02 {
        VolClass::High
    } else {
        VolClass::VeryHigh
    }
}

/// Builds a [`VolReading`] from candles and the assumed hourly vol,
/// clamping realized vol to `[floor, ceiling]`.
#[must_use]
pub fn vol_reading(
    candles: &[Candle],
    assumed_hourly: f64,
    floor: f64,
    ceiling: f64,
) -> VolReading {
    let realized = realized_hourly_vol(candles)
        .unwrap_or(assumed_hourly)
        .clamp(floor, ceiling);
    VolReading {
        realized_hourly: realized,
        assumed_hourly,
        ratio: if assumed_hourly > 0.0 {
            realized / assumed_hourly
        } else {
            1.0
        },
        class: vol_class(candles),
    }
}

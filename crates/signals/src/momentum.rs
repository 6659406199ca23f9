//! Multi-timeframe momentum.
//!
//! Three lookbacks (1h, 4h, 24h) each yield a direction and a bounded
//! strength; the composite weights them 0.5/0.3/0.2. Alignment means
//! every non-neutral timeframe points the same way, which earns the
//! larger probability adjustment.

use autotrader_core::types::{Candle, MomentumDirection, Side};
use serde::{Deserialize, Serialize};

/// Returns below this magnitude count as neutral.
const NEUTRAL_BAND: f64 = 0.001;

/// (lookback hours, composite weight)
const WINDOWS: [(usize, f64); 3] = [(1, 0.5), (4, 0.3), (24, 0.2)];

/// One timeframe's momentum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeframeMomentum {
    pub hours: usize,
    /// Fractional price change over the lookback.
    pub change: f64,
    /// -1 / 0 / +1.
    pub direction: i8,
    /// In [0, 1].
    pub strength: f64,
}

/// Composite momentum across timeframes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Momentum {
    pub timeframes: Vec<TimeframeMomentum>,
    /// Weighted sum of direction × strength, in [-1, 1].
    pub composite: f64,
    pub direction: MomentumDirection,
    /// Magnitude of the composite, in [0, 1].
    pub strength: f64,
    /// All non-neutral timeframes agree.
    pub aligned: bool,
}

impl Momentum {
    /// A momentum reading that moves nothing (missing data).
    #[must_use]
    pub fn flat() -> Self {
        Self {
            timeframes: Vec::new(),
            composite: 0.0,
            direction: MomentumDirection::Neutral,
            strength: 0.0,
            aligned: false,
        }
    }

    /// Additive probability adjustment for `side`: positive when
    /// momentum supports the side, negative when it opposes it. Aligned
    /// momentum moves up to 0.15, mixed momentum up to 0.08.
    #[must_use]
    pub fn prob_adjustment(&self, side: Side) -> f64 {
        let scale = if self.aligned { 0.15 } else { 0.08 };
        let signed = self.composite * scale;
        match side {
            Side::Yes => signed,
            Side::No => -signed,
        }
    }

    /// True when `side` is the side this momentum supports.
    #[must_use]
    pub fn supports(&self, side: Side) -> bool {
        self.direction.favored_side() == Some(side)
    }

    /// Strong opposition veto: the candidate side fights momentum with
    /// composite beyond 0.3 and strength beyond 0.3.
    #[must_use]
    pub fn strongly_opposes(&self, side: Side) -> bool {
        let opposed = match side {
            Side::Yes => self.composite < -0.3,
            Side::No => self.composite > 0.3,
        };
        opposed && self.strength > 0.3
    }
}

fn timeframe(closes: &[f64], hours: usize) -> Option<TimeframeMomentum> {
    if closes.len() < hours + 1 {
        return None;
    }
    let now = *closes.last()?;
    let then = closes[closes.len() - 1 - hours];
    if then <= 0.0 {
        return None;
    }
    let change = (now - then) / then;
    let direction = if change.abs() < NEUTRAL_BAND {
        0
    } else if change > 0.0 {
        1
    } else {
        -1
    };
    Some(TimeframeMomentum {
        hours,
        change,
        direction,
        strength: (change.abs() * 20.0).min(1.0),
    })
}

/// Computes composite momentum from hourly candles (oldest first).
#[must_use]
pub fn momentum(candles: &[Candle]) -> Momentum {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let mut timeframes = Vec::with_capacity(WINDOWS.len());
    let mut composite = 0.0;
    let mut weight_sum = 0.0;
    for (hours, weight) in WINDOWS {
        if let Some(tf) = timeframe(&closes, hours) {
            composite += weight * f64::from(tf.direction) * tf.strength;
            weight_sum += weight;
            timeframes.push(tf);
        }
    }
    if timeframes.is_empty() {
        return Momentum::flat();
    }
    composite /= weight_sum;

    let non_neutral: Vec<i8> = timeframes
        .iter()
        .map(|tf| tf.direction)
        .filter(|d| *d != 0)
        .collect();
    let aligned = non_neutral.len() > 1 && non_neutral.windows(2).all(|w| w[0] == w[1]);

    let direction = if composite > 0.2 {
        MomentumDirection::Bullish
    } else if composite < -0.2 {
        MomentumDirection::Bearish
    } else {
        MomentumDirection::Neutral
    };

    Momentum {
        strength: composite.abs().min(1.0),
        timeframes,
        composite,
        direction,
        aligned,
    }
}

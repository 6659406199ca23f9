//! Regime classification with hysteresis.
//!
//! Three classes: trending (sustained directional move with momentum
//! agreement), volatile (elevated ranges without net direction), ranging
//! (everything else). A class must be observed twice in a row before the
//! tracker switches, and a switch is flagged so the cycle can write an
//! alert record.

use crate::momentum::Momentum;
use crate::volatility::{vol_class, VolClass};
use autotrader_core::types::{Candle, Regime};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One classification with its confidence and inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    /// In [0, 1]; drives the trending min-edge relaxation.
    pub confidence: f64,
    pub vol_class: VolClass,
    /// 4-hour fractional price change.
    pub change_4h: f64,
    /// 24-hour fractional price change.
    pub change_24h: f64,
    /// The class changed since the previous cycle.
    pub changed: bool,
}

fn change_over(closes: &[f64], hours: usize) -> f64 {
    if closes.len() < hours + 1 {
        return 0.0;
    }
    let now = closes[closes.len() - 1];
    let then = closes[closes.len() - 1 - hours];
    if then <= 0.0 {
        return 0.0;
    }
    (now - then) / then
}

fn classify(candles: &[Candle], momentum: &Momentum) -> (Regime, f64, f64, f64, VolClass) {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let change_4h = change_over(&closes, 4);
    let change_24h = change_over(&closes, 24);
    let vc = vol_class(candles);

    let directional = change_4h.abs() > 0.005
        && change_24h.abs() > 0.01
        && change_4h.signum() == change_24h.signum()
        && momentum.composite.abs() > 0.2
        && momentum.aligned;

    if directional {
        let confidence = (momentum.strength + (change_24h.abs() * 20.0).min(1.0)) / 2.0;
        return (Regime::Trending, confidence.min(1.0), change_4h, change_24h, vc);
    }

    if vc.is_elevated() && change_24h.abs() < 0.02 {
        return (Regime::Volatile, 0.6, change_4h, change_24h, vc);
    }

    (Regime::Ranging, 0.5, change_4h, change_24h, vc)
}

/// Carries regime state across cycles to apply hysteresis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegimeTracker {
    current: Option<Regime>,
    /// Candidate class observed exactly once.
    pending: Option<Regime>,
}

impl RegimeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current regime, before any new observation.
    #[must_use]
    pub fn current(&self) -> Option<Regime> {
        self.current
    }

    /// Feeds one cycle's candles and momentum; returns the reading after
    /// hysteresis.
    pub fn observe(&mut self, candles: &[Candle], momentum: &Momentum) -> RegimeReading {
        let (observed, confidence, change_4h, change_24h, vc) = classify(candles, momentum);

        let (effective, changed) = match self.current {
            None => {
                self.current = Some(observed);
                (observed, false)
            }
            Some(current) if current == observed => {
                self.pending = None;
                (current, false)
            }
            Some(current) => {
                if self.pending == Some(observed) {
                    // Second consecutive sighting: commit the switch.
                    self.current = Some(observed);
                    self.pending = None;
                    info!(from = %current, to = %observed, "regime change");
                    (observed, true)
                } else {
                    self.pending = Some(observed);
                    (current, false)
                }
            }
        };

        RegimeReading {
            regime: effective,
            confidence,
            vol_class: vc,
            change_4h,
            change_24h,
            changed,
        }
    }
}

/// Regime-aware minimum-edge adjustment used by the finder's dynamic
/// floor: trending relaxes with confidence, volatile demands the most,
/// elevated vol tightens, quiet vol loosens slightly. Clamped to
/// [0.05, 0.20].
#[must_use]
pub fn dynamic_min_edge(reading: &RegimeReading) -> f64 {
    let base = match reading.regime {
        Regime::Trending => 0.07 + (1.0 - reading.confidence) * 0.03,
        Regime::Volatile => 0.15,
        Regime::Ranging => 0.12,
    };
    let vol_shift = match reading.vol_class {
        VolClass::High | VolClass::VeryHigh => 0.02,
        VolClass::VeryLow | VolClass::Low => -0.01,
        VolClass::Normal => 0.0,
    };
    (base + vol_shift).clamp(0.05, 0.20)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::momentum::momentum;
    use crate::volatility::test_support::candles_from_closes;

    fn rising(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + step).powi(i as i32)).collect()
    }

    #[test]
    fn sustained_rise_classifies_trending() {
        let candles = candles_from_closes(&rising(30, 0.004), 0.004);
        let m = momentum(&candles);
        let mut tracker = RegimeTracker::new();
        let reading = tracker.observe(&candles, &m);
        assert_eq!(reading.regime, Regime::Trending);
        assert!(reading.confidence > 0.3);
        assert!(!reading.changed, "first observation is not a change");
    }

    #[test]
    fn wide_ranges_without_direction_classify_volatile() {
        let candles = candles_from_closes(&[100.0; 30], 0.025);
        let m = momentum(&candles);
        let mut tracker = RegimeTracker::new();
        let reading = tracker.observe(&candles, &m);
        assert_eq!(reading.regime, Regime::Volatile);
    }

    #[test]
    fn quiet_flat_market_is_ranging() {
        let candles = candles_from_closes(&[100.0; 30], 0.004);
        let m = momentum(&candles);
        let mut tracker = RegimeTracker::new();
        assert_eq!(tracker.observe(&candles, &m).regime, Regime::Ranging);
    }

    #[test]
    fn hysteresis_needs_two_sightings_to_switch() {
        let flat = candles_from_closes(&[100.0; 30], 0.004);
        let trend = candles_from_closes(&rising(30, 0.004), 0.004);
        let m_flat = momentum(&flat);
        let m_trend = momentum(&trend);

        let mut tracker = RegimeTracker::new();
        assert_eq!(tracker.observe(&flat, &m_flat).regime, Regime::Ranging);

        // One trending observation: still ranging.
        let reading = tracker.observe(&trend, &m_trend);
        assert_eq!(reading.regime, Regime::Ranging);
        assert!(!reading.changed);

        // Second in a row: switch, flagged.
        let reading = tracker.observe(&trend, &m_trend);
        assert_eq!(reading.regime, Regime::Trending);
        assert!(reading.changed);

        // A single flat blip does not flap back.
        let reading = tracker.observe(&flat, &m_flat);
        assert_eq!(reading.regime, Regime::Trending);
        assert!(!reading.changed);
    }

    #[test]
    fn dynamic_edge_by_regime() {
        let base = RegimeReading {
            regime: Regime::Ranging,
            confidence: 0.5,
            vol_class: VolClass::Normal,
            change_4h: 0.0,
            change_24h: 0.0,
            changed: false,
        };
        assert_eq!(dynamic_min_edge(&base), 0.12);

        let volatile = RegimeReading {
            regime: Regime::Volatile,
            vol_class: VolClass::High,
            ..base.clone()
        };
        assert!((dynamic_min_edge(&volatile) - 0.17).abs() < 1e-12);

        let confident_trend = RegimeReading {
            regime: Regime::Trending,
            confidence: 1.0,
            vol_class: VolClass::Low,
            ..base.clone()
        };
        // 0.07 base at full confidence, minus the quiet-vol loosening.
        assert!((dynamic_min_edge(&confident_trend) - 0.06).abs() < 1e-12);
    }
}

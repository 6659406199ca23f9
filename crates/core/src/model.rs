//! Fair-value probability model for single-strike binary contracts.
//!
//! Crypto markets are priced under a driftless lognormal diffusion: the
//! log-return to expiry is Normal(0, σ²) with σ = hourly_vol · √hours, and
//! the YES probability is Φ(ln(spot/strike)/σ − σ/2). Weather markets are
//! priced directly from a forecast point estimate and uncertainty band.
//!
//! The pricer is pure: no I/O, no state beyond its configuration knobs.

use crate::types::WeatherKind;
use serde::{Deserialize, Serialize};

/// Standard Normal CDF via the Abramowitz–Stegun erf approximation
/// (maximum absolute error ~1.5e-7, far below the cent granularity of
/// the markets being priced).
#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989422804014327 * (-x * x / 2.0).exp();
    let poly = t
        * (0.319381530 + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let p = 1.0 - d * poly;
    if x >= 0.0 {
        p
    } else {
        1.0 - p
    }
}

/// Configuration for the binary contract pricer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryPricer {
    /// Lower clamp on any model probability.
    pub prob_floor: f64,
    /// Upper clamp on any model probability.
    pub prob_ceiling: f64,
    /// Multiplier applied to forecast uncertainty before pricing weather
    /// markets (inflates a habitually overconfident forecast).
    pub weather_calibration_factor: f64,
}

impl Default for BinaryPricer {
    fn default() -> Self {
        Self {
            prob_floor: 0.01,
            prob_ceiling: 0.99,
            weather_calibration_factor: 1.0,
        }
    }
}

impl BinaryPricer {
    /// Probability that spot finishes at or above `strike` after
    /// `hours_to_expiry` hours.
    ///
    /// Degenerate inputs (non-positive vol, non-positive time, or a
    /// non-positive price) collapse to the indicator `spot >= strike`.
    /// Results are clamped to `[prob_floor, prob_ceiling]` for the
    /// non-degenerate case.
    #[must_use]
    pub fn prob_above_strike(
        &self,
        spot: f64,
        strike: f64,
        hourly_vol: f64,
        hours_to_expiry: f64,
    ) -> f64 {
        if spot <= 0.0 || strike <= 0.0 || hourly_vol <= 0.0 || hours_to_expiry <= 0.0 {
            return if spot >= strike { 1.0 } else { 0.0 };
        }
        let sigma = hourly_vol * hours_to_expiry.sqrt();
        let d = (spot / strike).ln() / sigma - sigma / 2.0;
        norm_cdf(d).clamp(self.prob_floor, self.prob_ceiling)
    }

    /// YES probability for a weather market with the given threshold.
    ///
    /// Temperature at settlement is modeled as Normal(forecast,
    /// uncertainty²) with uncertainty inflated by the calibration factor.
    /// For a HIGH market YES means actual ≥ threshold; for a LOW market
    /// YES means actual ≤ threshold. Returns `None` when the uncertainty
    /// is non-positive, which callers treat as "skip this market".
    #[must_use]
    pub fn weather_yes_prob(
        &self,
        kind: WeatherKind,
        threshold_f: f64,
        forecast_f: f64,
        uncertainty_f: f64,
    ) -> Option<f64> {
        if uncertainty_f <= 0.0 {
            return None;
        }
        let sigma = uncertainty_f * self.weather_calibration_factor;
        let z = (threshold_f - forecast_f) / sigma;
        let prob = match kind {
            WeatherKind::High => 1.0 - norm_cdf(z),
            WeatherKind::Low => norm_cdf(z),
        };
        Some(prob.clamp(self.prob_floor, self.prob_ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    // ===== Normal CDF =====

    #[test]
    fn norm_cdf_symmetry_and_anchors() {
        assert!((norm_cdf(0.0) - 0.5).abs() < EPS);
        assert!((norm_cdf(1.0) - 0.841_345).abs() < 1e-4);
        assert!((norm_cdf(-1.0) - 0.158_655).abs() < 1e-4);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        for x in [-3.0, -0.7, 0.0, 0.3, 2.5] {
            assert!((norm_cdf(x) + norm_cdf(-x) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn norm_cdf_tails_stay_in_unit_interval() {
        assert!(norm_cdf(-10.0) >= 0.0);
        assert!(norm_cdf(-10.0) < 1e-8);
        assert!(norm_cdf(10.0) <= 1.0);
        assert!(norm_cdf(10.0) > 1.0 - 1e-8);
    }

    // ===== Crypto diffusion =====

    #[test]
    fn at_the_money_is_near_half() {
        let pricer = BinaryPricer::default();
        // d = -σ/2, so slightly below 0.5 for spot == strike.
        let p = pricer.prob_above_strike(68_000.0, 68_000.0, 0.005, 1.0);
        assert!(p < 0.5);
        assert!(p > 0.49);
    }

    #[test]
    fn deep_in_and_out_of_the_money() {
        let pricer = BinaryPricer::default();
        let deep_itm = pricer.prob_above_strike(68_000.0, 60_000.0, 0.005, 1.0);
        let deep_otm = pricer.prob_above_strike(68_000.0, 75_000.0, 0.005, 1.0);
        assert!((deep_itm - 0.99).abs() < EPS, "clamped at ceiling");
        assert!((deep_otm - 0.01).abs() < EPS, "clamped at floor");
    }

    #[test]
    fn scenario_spot_above_strike_one_hour() {
        // Spot 68,000 / strike 67,500 / vol 0.005 / 1h:
        // d = ln(68000/67500)/0.005 - 0.0025 ≈ 1.4733 → Φ(d) ≈ 0.9296.
        let pricer = BinaryPricer::default();
        let p = pricer.prob_above_strike(68_000.0, 67_500.0, 0.005, 1.0);
        assert!((p - 0.9296).abs() < 1e-3);
    }

    #[test]
    fn probability_tightens_as_expiry_approaches() {
        let pricer = BinaryPricer::default();
        let far = pricer.prob_above_strike(68_000.0, 67_500.0, 0.005, 6.0);
        let near = pricer.prob_above_strike(68_000.0, 67_500.0, 0.005, 0.25);
        assert!(near > far, "less time means less chance to cross back");
    }

    #[test]
    fn degenerate_inputs_collapse_to_indicator() {
        let pricer = BinaryPricer::default();
        assert_eq!(pricer.prob_above_strike(68_000.0, 67_500.0, 0.0, 1.0), 1.0);
        assert_eq!(pricer.prob_above_strike(67_000.0, 67_500.0, 0.005, 0.0), 0.0);
        assert_eq!(pricer.prob_above_strike(0.0, 67_500.0, 0.005, 1.0), 0.0);
    }

    #[test]
    fn bounds_hold_across_input_grid() {
        let pricer = BinaryPricer::default();
        for spot in [100.0, 68_000.0, 120_000.0] {
            for strike in [90.0, 67_500.0, 130_000.0] {
                for vol in [0.001, 0.005, 0.05] {
                    for hours in [0.1, 1.0, 24.0] {
                        let p = pricer.prob_above_strike(spot, strike, vol, hours);
                        assert!((0.0..=1.0).contains(&p));
                    }
                }
            }
        }
    }

    // ===== Weather =====

    #[test]
    fn weather_high_above_forecast_threshold() {
        let pricer = BinaryPricer::default();
        // Forecast 75°F ± 3°F, threshold 72°F: YES (high ≥ 72) is likely.
        let p = pricer
            .weather_yes_prob(WeatherKind::High, 72.0, 75.0, 3.0)
            .unwrap();
        assert!((p - norm_cdf(1.0)).abs() < 1e-9);
    }

    #[test]
    fn weather_low_market_inverts() {
        let pricer = BinaryPricer::default();
        let high = pricer
            .weather_yes_prob(WeatherKind::High, 30.0, 28.0, 4.0)
            .unwrap();
        let low = pricer
            .weather_yes_prob(WeatherKind::Low, 30.0, 28.0, 4.0)
            .unwrap();
        assert!((high + low - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weather_missing_uncertainty_skips() {
        let pricer = BinaryPricer::default();
        assert!(pricer
            .weather_yes_prob(WeatherKind::High, 72.0, 75.0, 0.0)
            .is_none());
    }

    #[test]
    fn weather_calibration_widens_distribution() {
        let pricer = BinaryPricer {
            weather_calibration_factor: 2.0,
            ..Default::default()
        };
        let inflated = pricer
            .weather_yes_prob(WeatherKind::High, 72.0, 78.0, 3.0)
            .unwrap();
        let tight = BinaryPricer::default()
            .weather_yes_prob(WeatherKind::High, 72.0, 78.0, 3.0)
            .unwrap();
        assert!(inflated < tight, "wider band pulls probability toward 0.5");
    }
}

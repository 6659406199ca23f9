//! The mutable policy parameter bundle.
//!
//! Everything the sizing and safety layer consults lives here, persisted
//! as `policy.json`. The runner reloads the file at the top of every
//! cycle and the auto-tune engine is the only writer besides initial
//! seeding, so parameter changes flow through disk rather than through
//! shared memory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::Regime;

/// Regime-specific minimum-edge floors plus the global bounds the
/// auto-tuner must respect when it moves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgePolicy {
    pub min_edge_trending: f64,
    pub min_edge_ranging: f64,
    pub min_edge_volatile: f64,
    /// No tuned floor may go below this.
    pub hard_floor: f64,
    /// No tuned floor may go above this.
    pub hard_ceiling: f64,
}

impl Default for EdgePolicy {
    fn default() -> Self {
        Self {
            min_edge_trending: 0.10,
            min_edge_ranging: 0.12,
            min_edge_volatile: 0.18,
            hard_floor: 0.05,
            hard_ceiling: 0.20,
        }
    }
}

/// Fractional-Kelly sizing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyPolicy {
    /// κ in f = clamp(κ · edge_adj / (1 − p_m), 0, max_fraction).
    pub kappa: f64,
    /// Upper bound on the bankroll fraction per trade.
    pub max_fraction: f64,
    pub min_bet_cents: i64,
    pub max_stake_cents: i64,
}

impl Default for KellyPolicy {
    fn default() -> Self {
        Self {
            kappa: 0.25,
            max_fraction: 0.10,
            min_bet_cents: 5,
            max_stake_cents: 1_000,
        }
    }
}

/// Exposure caps, checked in order by the sizing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsPolicy {
    /// Open exposure cap per asset family, fraction of bankroll.
    pub per_asset_pct: f64,
    /// Crypto group cap under normal BTC/ETH correlation.
    pub crypto_group_pct: f64,
    /// Crypto group cap when correlation is high (ρ ≥ 0.9).
    pub crypto_group_tight_pct: f64,
    pub weather_group_pct: f64,
    pub total_open_pct: f64,
    pub max_open_positions: usize,
}

impl Default for CapsPolicy {
    fn default() -> Self {
        Self {
            per_asset_pct: 0.15,
            crypto_group_pct: 0.50,
            crypto_group_tight_pct: 0.30,
            weather_group_pct: 0.50,
            total_open_pct: 0.80,
            max_open_positions: 30,
        }
    }
}

/// Win/loss streak modifiers and the tilt circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakPolicy {
    /// Consecutive wins before `hot_hand` shrinks the stake.
    pub hot_hand_threshold: u32,
    pub hot_hand_factor: f64,
    /// Consecutive losses before `tilt_risk` shrinks the stake.
    pub tilt_threshold: u32,
    pub tilt_factor: f64,
    /// Consecutive losses that suspend trading for the session.
    pub circuit_breaker_losses: u32,
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            hot_hand_threshold: 3,
            hot_hand_factor: 0.5,
            tilt_threshold: 3,
            tilt_factor: 0.5,
            circuit_breaker_losses: 5,
        }
    }
}

/// Session kill-switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillPolicy {
    pub daily_loss_limit_cents: i64,
    /// Drawdown from session peak that halts trading, fraction.
    pub drawdown_halt_pct: f64,
    /// Consecutive provider/venue errors that halt the cycle.
    pub api_error_breaker: u32,
}

impl Default for KillPolicy {
    fn default() -> Self {
        Self {
            daily_loss_limit_cents: 500,
            drawdown_halt_pct: 0.20,
            api_error_breaker: 5,
        }
    }
}

/// Volatility inputs for the diffusion pricer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolPolicy {
    pub btc_hourly_default: f64,
    pub eth_hourly_default: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// Lookback for realized volatility, hours.
    pub window_hours: usize,
}

impl Default for VolPolicy {
    fn default() -> Self {
        Self {
            btc_hourly_default: 0.005,
            eth_hourly_default: 0.007,
            floor: 0.001,
            ceiling: 0.05,
            window_hours: 24,
        }
    }
}

/// Pre-scoring market filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Model probabilities below this never trade.
    pub prob_floor: f64,
    /// Market-implied probabilities above this never trade.
    pub conviction_ceiling: f64,
    pub extreme_price_low_cents: i64,
    pub extreme_price_high_cents: i64,
    pub spread_tolerance_cents: i64,
    pub min_minutes_to_expiry: i64,
    pub max_trades_per_hour: usize,
    /// Candidates carried into sizing each cycle.
    pub top_k: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            prob_floor: 0.05,
            conviction_ceiling: 0.85,
            extreme_price_low_cents: 5,
            extreme_price_high_cents: 95,
            spread_tolerance_cents: 5,
            min_minutes_to_expiry: 45,
            max_trades_per_hour: 3,
            top_k: 10,
        }
    }
}

/// Weather-specific gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherPolicy {
    /// Required |forecast − threshold| gap, °F.
    pub min_gap_f: f64,
    /// Forecast uncertainty at or above this overrides a small gap, °F.
    pub uncertainty_override_f: f64,
    /// Strikes within this many sigmas of the forecast are skipped.
    pub central_band_z: f64,
    pub calibration_factor: f64,
}

impl Default for WeatherPolicy {
    fn default() -> Self {
        Self {
            min_gap_f: 2.0,
            uncertainty_override_f: 5.0,
            central_band_z: 1.0,
            calibration_factor: 1.0,
        }
    }
}

/// Paper-trading behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperPolicy {
    pub starting_bankroll_cents: i64,
    /// When true, paper settlements are seeded Bernoulli draws against
    /// the model probability instead of deferred ground-truth
    /// settlement. Only useful for reproducibility tests.
    pub simulated_bernoulli: bool,
    pub rng_seed: u64,
}

impl Default for PaperPolicy {
    fn default() -> Self {
        Self {
            starting_bankroll_cents: 5_000,
            simulated_bernoulli: false,
            rng_seed: 0,
        }
    }
}

/// Auto-tune behavior bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunePolicy {
    /// Settled trades required before changes apply autonomously.
    pub min_trades_for_auto: usize,
    /// Minimum bucket sample size for a recommendation.
    pub min_bucket_samples: usize,
    /// Largest move of any edge floor per tune run.
    pub max_edge_step: f64,
    /// Mean absolute calibration error that triggers a recalibration
    /// recommendation.
    pub calibration_alert: f64,
}

impl Default for TunePolicy {
    fn default() -> Self {
        Self {
            min_trades_for_auto: 100,
            min_bucket_samples: 5,
            max_edge_step: 0.02,
            calibration_alert: 0.15,
        }
    }
}

/// The complete parameter bundle consulted by the sizing policy.
///
/// Mutated only by the auto-tune engine, always through
/// [`PolicyParams::save`] so readers observe whole files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    pub edges: EdgePolicy,
    pub kelly: KellyPolicy,
    pub caps: CapsPolicy,
    pub streaks: StreakPolicy,
    pub kills: KillPolicy,
    pub vol: VolPolicy,
    pub filters: FilterPolicy,
    pub weather: WeatherPolicy,
    pub paper: PaperPolicy,
    pub tune: TunePolicy,
}

impl PolicyParams {
    /// Minimum-edge floor for a regime, never below the global hard
    /// floor.
    #[must_use]
    pub fn min_edge_for(&self, regime: Regime) -> f64 {
        let floor = match regime {
            Regime::Trending => self.edges.min_edge_trending,
            Regime::Ranging => self.edges.min_edge_ranging,
            Regime::Volatile => self.edges.min_edge_volatile,
        };
        floor.max(self.edges.hard_floor)
    }

    /// Default hourly volatility for an asset, from policy.
    #[must_use]
    pub fn default_hourly_vol(&self, asset: crate::types::Asset) -> f64 {
        match asset {
            crate::types::Asset::Btc => self.vol.btc_hourly_default,
            crate::types::Asset::Eth => self.vol.eth_hourly_default,
        }
    }

    /// Loads the bundle from `path`, falling back to defaults when the
    /// file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or
    /// parsed. That is a startup configuration error, not something to
    /// paper over mid-session.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?;
        let params = serde_json::from_str(&raw)
            .with_context(|| format!("parsing policy file {}", path.display()))?;
        Ok(params)
    }

    /// Atomically writes the bundle to `path` (temp file + rename), so a
    /// concurrent reader never observes a torn document.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or filesystem failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(self).context("serializing policy")?;
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    #[test]
    fn defaults_are_ordered_sensibly() {
        let p = PolicyParams::default();
        assert!(p.edges.min_edge_trending < p.edges.min_edge_ranging);
        assert!(p.edges.min_edge_ranging < p.edges.min_edge_volatile);
        assert!(p.edges.hard_floor <= p.edges.min_edge_trending);
        assert!(p.edges.hard_ceiling >= p.edges.min_edge_volatile);
        assert!(p.caps.crypto_group_tight_pct < p.caps.crypto_group_pct);
        assert!(p.kelly.kappa <= 0.5);
        assert!(p.kelly.max_fraction <= 0.10);
    }

    #[test]
    fn min_edge_for_selects_regime_floor() {
        let p = PolicyParams::default();
        assert_eq!(p.min_edge_for(Regime::Trending), 0.10);
        assert_eq!(p.min_edge_for(Regime::Ranging), 0.12);
        assert_eq!(p.min_edge_for(Regime::Volatile), 0.18);
        assert_eq!(p.default_hourly_vol(Asset::Eth), 0.007);
    }

    #[test]
    fn global_hard_floor_binds_every_regime() {
        let mut p = PolicyParams::default();
        p.edges.hard_floor = 0.15;
        assert_eq!(p.min_edge_for(Regime::Trending), 0.15);
        assert_eq!(p.min_edge_for(Regime::Ranging), 0.15);
        assert_eq!(p.min_edge_for(Regime::Volatile), 0.18);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let loaded = PolicyParams::load(&path).unwrap();
        assert_eq!(loaded, PolicyParams::default());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let mut params = PolicyParams::default();
        params.edges.min_edge_ranging = 0.14;
        params.kills.daily_loss_limit_cents = 750;
        params.save(&path).unwrap();
        let loaded = PolicyParams::load(&path).unwrap();
        assert_eq!(loaded, params);
        // No leftover temp file.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"edges": {"min_edge_trending": 0.08}}"#).unwrap();
        let loaded = PolicyParams::load(&path).unwrap();
        assert_eq!(loaded.edges.min_edge_trending, 0.08);
        assert_eq!(loaded.edges.min_edge_ranging, 0.12);
        assert_eq!(loaded.kelly, KellyPolicy::default());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(PolicyParams::load(&path).is_err());
    }
}

//! The tuning engine: recommendations, bounded application, audit.
//!
//! Recommendations follow from bucket statistics alone. Application is
//! gated on a minimum settled-trade count, every parameter move is
//! bounded by the policy's own step limit and hard bounds, and each
//! applied change appends an audit line to `tune-history.jsonl` before
//! the mutated policy is saved.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use autotrader_core::policy::PolicyParams;
use autotrader_core::types::Regime;
use autotrader_ledger::TradeRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::{analyze, Analysis, BucketStats};

/// Excess win rate over breakeven that justifies loosening a floor.
const LOOSEN_MARGIN: f64 = 0.10;
/// ROI below which an asset family's cap gets cut.
const CAP_CUT_ROI: f64 = -0.20;
const CAP_CUT_FACTOR: f64 = 0.75;
const CAP_FLOOR_PCT: f64 = 0.05;

/// One recommended (and possibly applied) parameter change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TuneChange {
    RegimeMinEdge {
        regime: Regime,
        from: f64,
        to: f64,
        reason: String,
    },
    PerAssetCap {
        family: String,
        from: f64,
        to: f64,
        reason: String,
    },
    /// Raises the floor under every regime when low-edge trades are
    /// net losers.
    GlobalMinEdge {
        from: f64,
        to: f64,
        reason: String,
    },
    RecalibrationAlert {
        mae: f64,
    },
}

/// Audit line appended to `tune-history.jsonl` for each applied change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneAudit {
    pub timestamp: DateTime<Utc>,
    pub total_settled: usize,
    #[serde(flatten)]
    pub change: TuneChange,
}

/// The document written to `tune-report.json` after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneReport {
    pub generated_at: DateTime<Utc>,
    pub total_settled: usize,
    /// Changes were written into the live policy this run.
    pub applied: bool,
    pub recommendations: Vec<TuneChange>,
    pub analysis: Analysis,
}

pub struct TuneEngine;

impl TuneEngine {
    /// Derives recommendations from the analysis. Pure; bounded by the
    /// policy's step and hard limits so the output is directly
    /// appliable.
    #[must_use]
    pub fn recommend(analysis: &Analysis, policy: &PolicyParams) -> Vec<TuneChange> {
        let mut changes = Vec::new();
        let min_samples = policy.tune.min_bucket_samples;
        let step = policy.tune.max_edge_step;

        if let Some(regimes) = analysis.dimensions.get("regime") {
            for bucket in regimes {
                if bucket.trades < min_samples {
                    continue;
                }
                let Ok(regime) = bucket.label.parse::<RegimeLabel>() else {
                    continue;
                };
                let current = policy.min_edge_for(regime.0);
                if let Some(change) = regime_change(bucket, regime.0, current, step, policy) {
                    changes.push(change);
                }
            }
        }

        if let Some(assets) = analysis.dimensions.get("asset") {
            for bucket in assets {
                if bucket.trades < min_samples || bucket.roi() >= CAP_CUT_ROI {
                    continue;
                }
                let from = policy.caps.per_asset_pct;
                let to = (from * CAP_CUT_FACTOR).max(CAP_FLOOR_PCT);
                if to < from {
                    changes.push(TuneChange::PerAssetCap {
                        family: bucket.label.clone(),
                        from,
                        to,
                        reason: format!(
                            "roi {:.1}% over {} settled trades",
                            bucket.roi() * 100.0,
                            bucket.trades
                        ),
                    });
                }
            }
        }

        if let Some(edges) = analysis.dimensions.get("edge_bucket") {
            let (low_trades, low_pnl) = edges
                .iter()
                .filter(|b| matches!(b.label.as_str(), "0-5" | "5-10"))
                .fold((0usize, 0i64), |(n, pnl), b| (n + b.trades, pnl + b.pnl_cents));
            if low_trades >= min_samples && low_pnl < 0 {
                let from = policy.edges.hard_floor;
                let to = (from + step).min(policy.edges.hard_ceiling);
                if to > from {
                    changes.push(TuneChange::GlobalMinEdge {
                        from,
                        to,
                        reason: format!(
                            "low-edge buckets net {low_pnl}c over {low_trades} settled trades"
                        ),
                    });
                }
            }
        }

        if analysis.total_settled >= min_samples
            && analysis.calibration_mae >= policy.tune.calibration_alert
        {
            changes.push(TuneChange::RecalibrationAlert {
                mae: analysis.calibration_mae,
            });
        }

        changes
    }

    /// Analyzes, recommends, applies when the gate clears, and writes
    /// the report and audit files.
    ///
    /// # Errors
    ///
    /// Returns an error when the policy or report files cannot be
    /// written.
    pub fn run(
        trades: &[TradeRecord],
        policy: &mut PolicyParams,
        policy_path: &Path,
        report_path: &Path,
        history_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<TuneReport> {
        let analysis = analyze(trades);
        let recommendations = Self::recommend(&analysis, policy);
        let apply = analysis.total_settled >= policy.tune.min_trades_for_auto
            && recommendations
                .iter()
                .any(|c| !matches!(c, TuneChange::RecalibrationAlert { .. }));

        if apply {
            for change in &recommendations {
                apply_change(policy, change);
                append_audit(
                    history_path,
                    &TuneAudit {
                        timestamp: now,
                        total_settled: analysis.total_settled,
                        change: change.clone(),
                    },
                )?;
                info!(?change, "tune change applied");
            }
            policy
                .save(policy_path)
                .context("saving tuned policy parameters")?;
        }

        let report = TuneReport {
            generated_at: now,
            total_settled: analysis.total_settled,
            applied: apply,
            recommendations,
            analysis,
        };
        write_report(report_path, &report)?;
        Ok(report)
    }
}

struct RegimeLabel(Regime);

impl std::str::FromStr for RegimeLabel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trending" => Ok(Self(Regime::Trending)),
            "ranging" => Ok(Self(Regime::Ranging)),
            "volatile" => Ok(Self(Regime::Volatile)),
            _ => Err(()),
        }
    }
}

/// A regime bucket losing to its own entry prices (CI entirely below
/// breakeven) tightens its floor; one comfortably beating breakeven
/// loosens it. Moves are one bounded step.
fn regime_change(
    bucket: &BucketStats,
    regime: Regime,
    current: f64,
    step: f64,
    policy: &PolicyParams,
) -> Option<TuneChange> {
    let breakeven = bucket.avg_market_prob;
    if bucket.ci_high < breakeven {
        let to = (current + step).min(policy.edges.hard_ceiling);
        if to > current {
            return Some(TuneChange::RegimeMinEdge {
                regime,
                from: current,
                to,
                reason: format!(
                    "win rate {:.0}% (CI high {:.0}%) below breakeven {:.0}%",
                    bucket.win_rate * 100.0,
                    bucket.ci_high * 100.0,
                    breakeven * 100.0
                ),
            });
        }
    } else if bucket.ci_low > breakeven + LOOSEN_MARGIN {
        let to = (current - step).max(policy.edges.hard_floor);
        if to < current {
            return Some(TuneChange::RegimeMinEdge {
                regime,
                from: current,
                to,
                reason: format!(
                    "win rate {:.0}% (CI low {:.0}%) well above breakeven {:.0}%",
                    bucket.win_rate * 100.0,
                    bucket.ci_low * 100.0,
                    breakeven * 100.0
                ),
            });
        }
    }
    None
}

fn apply_change(policy: &mut PolicyParams, change: &TuneChange) {
    match change {
        TuneChange::RegimeMinEdge { regime, to, .. } => match regime {
            Regime::Trending => policy.edges.min_edge_trending = *to,
            Regime::Ranging => policy.edges.min_edge_ranging = *to,
            Regime::Volatile => policy.edges.min_edge_volatile = *to,
        },
        TuneChange::PerAssetCap { to, .. } => policy.caps.per_asset_pct = *to,
        TuneChange::GlobalMinEdge { to, .. } => policy.edges.hard_floor = *to,
        TuneChange::RecalibrationAlert { .. } => {}
    }
}

fn append_audit(path: &Path, audit: &TuneAudit) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(audit)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn write_report(path: &Path, report: &TuneReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(report)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

//! Bucketed performance analysis over settled trades.
//!
//! Every dimension the sizing policy conditions on gets a bucket:
//! asset family, side, regime, adjusted-edge band, hour of day,
//! momentum alignment, volatility alignment, and streak context.
//! Win rates carry Wilson 95% intervals so small buckets cannot drive
//! recommendations on noise.

use std::collections::BTreeMap;

use autotrader_ledger::{ResultStatus, TradeRecord};
use serde::{Deserialize, Serialize};

const WILSON_Z: f64 = 1.96;

/// Wilson score interval for a binomial proportion.
#[must_use]
pub fn wilson_interval(wins: usize, total: usize) -> (f64, f64) {
    if total == 0 {
        return (0.0, 1.0);
    }
    let n = total as f64;
    let p = wins as f64 / n;
    let z2 = WILSON_Z * WILSON_Z;
    let denom = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let margin = WILSON_Z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
    (
        ((center - margin) / denom).max(0.0),
        ((center + margin) / denom).min(1.0),
    )
}

/// Aggregates for one bucket of settled trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketStats {
    pub label: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl_cents: i64,
    pub cost_cents: i64,
    pub win_rate: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    /// Average entry price as a probability; the bucket's breakeven
    /// win rate.
    pub avg_market_prob: f64,
}

impl BucketStats {
    fn from_trades(label: String, trades: &[&TradeRecord]) -> Self {
        let wins = trades
            .iter()
            .filter(|t| t.result_status == ResultStatus::Won)
            .count();
        let total = trades.len();
        let pnl_cents = trades
            .iter()
            .map(|t| {
                t.realized_pnl_cents
                    .unwrap_or_else(|| t.pnl_cents(t.result_status == ResultStatus::Won))
            })
            .sum();
        let cost_cents = trades.iter().map(|t| t.cost_cents).sum();
        let (ci_low, ci_high) = wilson_interval(wins, total);
        Self {
            label,
            trades: total,
            wins,
            losses: total - wins,
            pnl_cents,
            cost_cents,
            win_rate: if total > 0 { wins as f64 / total as f64 } else { 0.0 },
            ci_low,
            ci_high,
            avg_market_prob: if total > 0 {
                trades.iter().map(|t| t.market_prob).sum::<f64>() / total as f64
            } else {
                0.0
            },
        }
    }

    /// Return on cost, the per-bucket ROI.
    #[must_use]
    pub fn roi(&self) -> f64 {
        if self.cost_cents == 0 {
            return 0.0;
        }
        self.pnl_cents as f64 / self.cost_cents as f64
    }
}

/// One 0.1-wide model-probability bucket for calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// Lower bound, e.g. 0.6 for the [0.6, 0.7) bucket.
    pub bucket: f64,
    pub samples: usize,
    pub predicted_mean: f64,
    pub actual_rate: f64,
}

/// The full analysis of a settled-trade set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub total_settled: usize,
    pub overall: BucketStats,
    /// Buckets grouped by dimension name (`asset`, `side`, `regime`,
    /// `edge_bucket`, `edge_band`, `hour`, `momentum_aligned`,
    /// `vol_aligned`, `streak`).
    pub dimensions: BTreeMap<String, Vec<BucketStats>>,
    pub calibration: Vec<CalibrationBucket>,
    /// Mean |predicted − actual| across populated calibration buckets.
    pub calibration_mae: f64,
    /// Mean per-trade return over its sample stdev.
    pub sharpe: Option<f64>,
}

/// Tuning-granularity edge bucket, in probability points.
fn edge_bucket(edge_adj: f64) -> &'static str {
    let pts = edge_adj * 100.0;
    if pts < 5.0 {
        "0-5"
    } else if pts < 10.0 {
        "5-10"
    } else if pts < 15.0 {
        "10-15"
    } else if pts < 20.0 {
        "15-20"
    } else {
        "20+"
    }
}

/// Reporting-granularity edge band.
fn edge_band(edge_adj: f64) -> &'static str {
    let pts = edge_adj * 100.0;
    if pts < 3.0 {
        "<3"
    } else if pts < 5.0 {
        "3-5"
    } else if pts < 10.0 {
        "5-10"
    } else {
        ">10"
    }
}

fn streak_label(trade: &TradeRecord) -> String {
    trade
        .streak_context
        .map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

fn group<'a, F>(trades: &[&'a TradeRecord], key: F) -> Vec<BucketStats>
where
    F: Fn(&TradeRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        groups.entry(key(trade)).or_default().push(trade);
    }
    groups
        .into_iter()
        .map(|(label, members)| BucketStats::from_trades(label, &members))
        .collect()
}

/// Analyzes the settled subset of `trades`.
#[must_use]
pub fn analyze(trades: &[TradeRecord]) -> Analysis {
    let settled: Vec<&TradeRecord> = trades
        .iter()
        .filter(|t| t.result_status.is_settled())
        .collect();

    let mut dimensions = BTreeMap::new();
    dimensions.insert("asset".to_string(), group(&settled, |t| t.asset.to_string()));
    dimensions.insert("side".to_string(), group(&settled, |t| t.side.to_string()));
    dimensions.insert(
        "regime".to_string(),
        group(&settled, |t| t.regime.to_string()),
    );
    dimensions.insert(
        "edge_bucket".to_string(),
        group(&settled, |t| edge_bucket(t.edge_adj).to_string()),
    );
    dimensions.insert(
        "edge_band".to_string(),
        group(&settled, |t| edge_band(t.edge_adj).to_string()),
    );
    dimensions.insert(
        "hour".to_string(),
        group(&settled, |t| t.timestamp.format("%H").to_string()),
    );
    dimensions.insert(
        "momentum_aligned".to_string(),
        group(&settled, |t| t.momentum_aligned.to_string()),
    );
    dimensions.insert(
        "vol_aligned".to_string(),
        group(&settled, |t| {
            t.vol_aligned
                .map_or_else(|| "unknown".to_string(), |v| v.to_string())
        }),
    );
    dimensions.insert("streak".to_string(), group(&settled, streak_label));

    let calibration = calibration_buckets(&settled);
    let calibration_mae = if calibration.is_empty() {
        0.0
    } else {
        calibration
            .iter()
            .map(|b| (b.predicted_mean - b.actual_rate).abs())
            .sum::<f64>()
            / calibration.len() as f64
    };

    let returns: Vec<f64> = settled
        .iter()
        .filter(|t| t.cost_cents > 0)
        .map(|t| {
            let pnl = t
                .realized_pnl_cents
                .unwrap_or_else(|| t.pnl_cents(t.result_status == ResultStatus::Won));
            pnl as f64 / t.cost_cents as f64
        })
        .collect();

    Analysis {
        total_settled: settled.len(),
        overall: BucketStats::from_trades("overall".to_string(), &settled),
        dimensions,
        calibration,
        calibration_mae,
        sharpe: sharpe(&returns),
    }
}

fn calibration_buckets(settled: &[&TradeRecord]) -> Vec<CalibrationBucket> {
    let mut buckets: BTreeMap<u32, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in settled {
        let idx = ((trade.our_prob * 10.0).floor() as u32).min(9);
        buckets.entry(idx).or_default().push(trade);
    }
    buckets
        .into_iter()
        .map(|(idx, members)| {
            let wins = members
                .iter()
                .filter(|t| t.result_status == ResultStatus::Won)
                .count();
            CalibrationBucket {
                bucket: f64::from(idx) / 10.0,
                samples: members.len(),
                predicted_mean: members.iter().map(|t| t.our_prob).sum::<f64>()
                    / members.len() as f64,
                actual_rate: wins as f64 / members.len() as f64,
            }
        })
        .collect()
}

fn sharpe(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    if var <= 0.0 {
        return None;
    }
    Some(mean / var.sqrt())
}

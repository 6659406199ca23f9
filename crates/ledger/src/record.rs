//! Persisted ledger record shapes.
//!
//! One record per JSONL line, discriminated by the `type` field. The
//! serde forms here are the on-disk file format: field names and string
//! values must stay stable across releases, and fields added later stay
//! `Option` so old lines keep deserializing.

use autotrader_core::types::{
    AssetFamily, ExecutionMode, MomentumDirection, Regime, Side, StreakContext,
};
use autotrader_strategy::{SizedTrade, SkipReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a recorded trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Won,
    Lost,
    /// Settlement ran but no reference price could be fetched; retried
    /// on later settlement passes.
    PriceFetchFailed,
}

impl ResultStatus {
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// One executed (or paper-simulated) trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub asset: AssetFamily,
    pub side: Side,
    pub contracts: i64,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub edge: f64,
    pub edge_adj: f64,
    pub our_prob: f64,
    pub market_prob: f64,
    pub kelly_fraction: f64,
    pub regime: Regime,
    pub momentum_dir: MomentumDirection,
    pub momentum_aligned: bool,
    pub vol_ratio: f64,
    /// Added after early records were written; never imputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vol_aligned: Option<bool>,
    /// Added after early records were written; never imputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak_context: Option<StreakContext>,
    pub tilt_risk: bool,
    pub hot_hand: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_bonus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot: Option<f64>,
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    pub execution_mode: ExecutionMode,
    pub result_status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl_cents: Option<i64>,
    /// Reference value settlement resolved against (price or °F).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Builds the pending record for a just-executed candidate.
    #[must_use]
    pub fn open(sized: &SizedTrade, mode: ExecutionMode, timestamp: DateTime<Utc>) -> Self {
        let opp = &sized.opportunity;
        Self {
            timestamp,
            ticker: opp.ticker.clone(),
            asset: opp.family.clone(),
            side: opp.side,
            contracts: sized.contracts,
            price_cents: opp.ask_cents,
            cost_cents: sized.cost_cents,
            edge: opp.edge,
            edge_adj: opp.edge_adj,
            our_prob: opp.our_prob,
            market_prob: opp.market_prob,
            kelly_fraction: sized.kelly_fraction,
            regime: opp.regime,
            momentum_dir: match opp.momentum_dir {
                1 => MomentumDirection::Bullish,
                -1 => MomentumDirection::Bearish,
                _ => MomentumDirection::Neutral,
            },
            momentum_aligned: opp.momentum_aligned,
            vol_ratio: opp.vol_ratio,
            vol_aligned: Some(opp.vol_aligned),
            streak_context: Some(sized.streak_context),
            tilt_risk: sized.tilt_risk,
            hot_hand: sized.hot_hand,
            news_bonus: (opp.news_bonus != 0.0).then_some(opp.news_bonus),
            spot: opp.spot,
            strike: opp.strike,
            expiry: opp.expiry,
            execution_mode: mode,
            result_status: ResultStatus::Pending,
            realized_pnl_cents: None,
            settlement_value: None,
            settled_at: None,
        }
    }

    /// Dedup identity: multiple tools may append to the same file.
    #[must_use]
    pub fn identity(&self) -> (DateTime<Utc>, &str, Side) {
        (self.timestamp, &self.ticker, self.side)
    }

    /// Winnings (or loss) in cents for a resolved binary position.
    #[must_use]
    pub fn pnl_cents(&self, won: bool) -> i64 {
        if won {
            (100 - self.price_cents) * self.contracts
        } else {
            -self.price_cents * self.contracts
        }
    }
}

/// One candidate vetoed by a filter, cap, or kill-switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub side: Side,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// End-of-cycle summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    pub markets_scanned: usize,
    pub candidates: usize,
    pub trades: usize,
    /// Skip-reason tally for the cycle, keyed by the wire string.
    #[serde(default)]
    pub skips: BTreeMap<String, usize>,
    pub latency_ms: u64,
    /// A critical datum was unavailable and part of the cycle was
    /// dropped.
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Operator-visible condition worth surfacing outside the tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
}

/// A parsed ledger line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Trade(TradeRecord),
    Skip(SkipRecord),
    CycleHeartbeat(HeartbeatRecord),
    Alert(AlertRecord),
}

impl Record {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade(r) => r.timestamp,
            Self::Skip(r) => r.timestamp,
            Self::CycleHeartbeat(r) => r.timestamp,
            Self::Alert(r) => r.timestamp,
        }
    }
}

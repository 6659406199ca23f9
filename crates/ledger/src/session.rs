//! Session-state cache.
//!
//! A derived document overwritten after each cycle so dashboards and
//! `status` never replay the ledger. It is a cache: [`SessionState::rebuild`]
//! reproduces it from trade records alone, and that replay is the
//! authoritative semantics.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use autotrader_strategy::AccountView;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{ResultStatus, TradeRecord};

/// Per-asset-family aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl_cents: i64,
    pub open_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub starting_bankroll_cents: i64,
    /// Cash: starting bankroll plus realized PnL minus open stakes.
    pub balance_cents: i64,
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    /// Signed streak: positive consecutive wins, negative losses.
    pub streak: i32,
    pub peak_balance_cents: i64,
    /// Worst peak-to-balance drawdown seen, fraction.
    pub max_drawdown_pct: f64,
    pub realized_pnl_cents: i64,
    /// Realized PnL attributed to `pnl_day`.
    pub daily_realized_pnl_cents: i64,
    pub pnl_day: Option<NaiveDate>,
    /// Sharpe-style ratio over per-trade returns, sample stdev.
    pub sharpe: Option<f64>,
    pub families: BTreeMap<String, FamilyStats>,
    pub last_cycle: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    #[must_use]
    pub fn fresh(starting_bankroll_cents: i64) -> Self {
        Self {
            starting_bankroll_cents,
            balance_cents: starting_bankroll_cents,
            wins: 0,
            losses: 0,
            pending: 0,
            streak: 0,
            peak_balance_cents: starting_bankroll_cents,
            max_drawdown_pct: 0.0,
            realized_pnl_cents: 0,
            daily_realized_pnl_cents: 0,
            pnl_day: None,
            sharpe: None,
            families: BTreeMap::new(),
            last_cycle: None,
            updated_at: Utc::now(),
        }
    }

    /// Replays deduplicated trade records into a fresh state.
    ///
    /// Settled trades apply in expiry order, which is what keeps the
    /// streak counter meaningful; open stakes subtract from cash.
    #[must_use]
    pub fn rebuild(trades: &[TradeRecord], starting_bankroll_cents: i64, today: NaiveDate) -> Self {
        let mut state = Self::fresh(starting_bankroll_cents);
        state.pnl_day = Some(today);

        let mut settled: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.result_status.is_settled())
            .collect();
        settled.sort_by_key(|t| t.expiry);

        let mut returns: Vec<f64> = Vec::new();
        for trade in &settled {
            let won = trade.result_status == ResultStatus::Won;
            let pnl = trade
                .realized_pnl_cents
                .unwrap_or_else(|| trade.pnl_cents(won));
            state.realized_pnl_cents += pnl;
            state.balance_cents += pnl;
            if trade
                .settled_at
                .map(|at| at.date_naive())
                .or_else(|| Some(trade.expiry.date_naive()))
                == Some(today)
            {
                state.daily_realized_pnl_cents += pnl;
            }

            if won {
                state.wins += 1;
                state.streak = if state.streak > 0 { state.streak + 1 } else { 1 };
            } else {
                state.losses += 1;
                state.streak = if state.streak < 0 { state.streak - 1 } else { -1 };
            }
            if trade.cost_cents > 0 {
                returns.push(pnl as f64 / trade.cost_cents as f64);
            }

            let family = state.families.entry(trade.asset.to_string()).or_default();
            family.trades += 1;
            if won {
                family.wins += 1;
            } else {
                family.losses += 1;
            }
            family.pnl_cents += pnl;

            if state.balance_cents > state.peak_balance_cents {
                state.peak_balance_cents = state.balance_cents;
            }
            if state.peak_balance_cents > 0 {
                let drawdown = (state.peak_balance_cents - state.balance_cents) as f64
                    / state.peak_balance_cents as f64;
                if drawdown > state.max_drawdown_pct {
                    state.max_drawdown_pct = drawdown;
                }
            }
        }

        for trade in trades {
            // Fetch-failed trades are still open: the stake is out and
            // the settlement pass retries them.
            if !trade.result_status.is_settled() {
                state.pending += 1;
                state.balance_cents -= trade.cost_cents;
                let family = state.families.entry(trade.asset.to_string()).or_default();
                family.trades += 1;
                family.open_cents += trade.cost_cents;
            }
        }

        state.sharpe = sharpe(&returns);
        state.updated_at = Utc::now();
        state
    }

    /// Return on the starting bankroll, fraction.
    #[must_use]
    pub fn roi(&self) -> f64 {
        if self.starting_bankroll_cents == 0 {
            return 0.0;
        }
        self.realized_pnl_cents as f64 / self.starting_bankroll_cents as f64
    }

    /// Derives the account view the sizing policy consumes, folding in
    /// the facts only the runner knows.
    #[must_use]
    pub fn account_view(
        &self,
        open_trades: &[TradeRecord],
        trades_this_hour: usize,
        consecutive_api_errors: u32,
        crypto_correlation_high: bool,
    ) -> AccountView {
        let mut family_open: HashMap<String, i64> = HashMap::new();
        let mut crypto_open = 0i64;
        let mut weather_open = 0i64;
        let mut total_open = 0i64;
        for trade in open_trades {
            *family_open.entry(trade.asset.to_string()).or_default() += trade.cost_cents;
            if trade.asset.is_crypto() {
                crypto_open += trade.cost_cents;
            } else {
                weather_open += trade.cost_cents;
            }
            total_open += trade.cost_cents;
        }
        AccountView {
            bankroll_cents: self.starting_bankroll_cents + self.realized_pnl_cents,
            balance_cents: self.balance_cents,
            peak_balance_cents: self.peak_balance_cents,
            daily_realized_pnl_cents: self.daily_realized_pnl_cents,
            streak: self.streak,
            open_positions: open_trades.len(),
            trades_this_hour,
            total_open_cents: total_open,
            family_open_cents: family_open,
            crypto_open_cents: crypto_open,
            weather_open_cents: weather_open,
            consecutive_api_errors,
            crypto_correlation_high,
        }
    }

    /// Loads the cache, or `None` when it has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable or corrupt files; callers then
    /// rebuild from the ledger.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically overwrites the cache (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Sharpe-style ratio: mean per-trade return over its sample stdev.
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

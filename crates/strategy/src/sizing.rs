//! Sizing and safety policy.
//!
//! [`decide`] is pure: the same candidate, account view, and policy
//! parameters always produce the same decision, and every modifier that
//! was applied comes back on the [`SizedTrade`] so the ledger can store
//! exactly what drove the sizing.
//!
//! Caps are checked in a fixed order and the first violation cancels the
//! candidate: per-trade stake, per-asset exposure, group exposure (with
//! the correlation-tightened crypto cap), total exposure.

use std::collections::HashMap;

use autotrader_core::policy::PolicyParams;
use autotrader_core::types::StreakContext;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::opportunity::{Opportunity, SkipReason};

/// The session facts the sizing policy consults, derived from the
/// session state and current-cycle bookkeeping before the first
/// candidate is sized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountView {
    pub bankroll_cents: i64,
    pub balance_cents: i64,
    pub peak_balance_cents: i64,
    /// Realized PnL since the daily rollover, cents.
    pub daily_realized_pnl_cents: i64,
    /// Signed: positive consecutive wins, negative consecutive losses.
    pub streak: i32,
    pub open_positions: usize,
    pub trades_this_hour: usize,
    pub total_open_cents: i64,
    /// Open exposure per asset family, keyed by the family string.
    pub family_open_cents: HashMap<String, i64>,
    pub crypto_open_cents: i64,
    pub weather_open_cents: i64,
    pub consecutive_api_errors: u32,
    /// BTC/ETH 7-day correlation at or above the tightening threshold.
    pub crypto_correlation_high: bool,
}

impl AccountView {
    fn family_open(&self, family: &str) -> i64 {
        self.family_open_cents.get(family).copied().unwrap_or(0)
    }
}

/// A candidate that survived sizing, ready for the execution gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizedTrade {
    pub opportunity: Opportunity,
    pub contracts: i64,
    /// contracts × ask, cents.
    pub cost_cents: i64,
    /// The bankroll fraction after all modifiers.
    pub kelly_fraction: f64,
    pub streak_context: StreakContext,
    pub hot_hand: bool,
    pub tilt_risk: bool,
}

/// The policy's verdict on one candidate.
#[derive(Debug, Clone)]
pub enum Decision {
    Trade(SizedTrade),
    Skip(SkipReason),
}

/// Session-level stop that suspends the whole cycle, independent of any
/// candidate. Checked once per cycle and again inside [`decide`].
#[must_use]
pub fn halt_reason(account: &AccountView, policy: &PolicyParams) -> Option<SkipReason> {
    if account.consecutive_api_errors >= policy.kills.api_error_breaker {
        return Some(SkipReason::KillApiErrors);
    }
    if account.daily_realized_pnl_cents <= -policy.kills.daily_loss_limit_cents {
        return Some(SkipReason::KillDailyLoss);
    }
    if account.peak_balance_cents > 0 {
        let drawdown = (account.peak_balance_cents - account.balance_cents) as f64
            / account.peak_balance_cents as f64;
        if drawdown >= policy.kills.drawdown_halt_pct {
            return Some(SkipReason::KillDrawdown);
        }
    }
    if account.streak <= -(policy.streaks.circuit_breaker_losses as i32) {
        return Some(SkipReason::CircuitBreakerTilt);
    }
    None
}

/// Sizes one candidate against the account view.
#[must_use]
pub fn decide(opp: &Opportunity, account: &AccountView, policy: &PolicyParams) -> Decision {
    if let Some(reason) = halt_reason(account, policy) {
        return Decision::Skip(reason);
    }
    if account.trades_this_hour >= policy.filters.max_trades_per_hour {
        return Decision::Skip(SkipReason::MaxTradesPerHour);
    }
    if account.open_positions >= policy.caps.max_open_positions {
        return Decision::Skip(SkipReason::MaxOpenPositions);
    }

    if opp.edge_adj < policy.min_edge_for(opp.regime) {
        return Decision::Skip(SkipReason::MinEdgeRegime);
    }

    // Fractional Kelly on the adjusted edge.
    let payout = 1.0 - opp.market_prob;
    if payout <= 0.0 {
        return Decision::Skip(SkipReason::ConvictionCeiling);
    }
    let raw_fraction =
        (policy.kelly.kappa * opp.edge_adj / payout).clamp(0.0, policy.kelly.max_fraction);

    let streak_context = StreakContext::from_streak(account.streak);
    let hot_hand = account.streak >= policy.streaks.hot_hand_threshold as i32;
    let tilt_risk = account.streak <= -(policy.streaks.tilt_threshold as i32);
    let mut fraction = raw_fraction;
    if hot_hand {
        fraction *= policy.streaks.hot_hand_factor;
    }
    if tilt_risk {
        fraction *= policy.streaks.tilt_factor;
    }

    let stake_cents = (fraction * account.bankroll_cents as f64).floor() as i64;
    if stake_cents > policy.kelly.max_stake_cents {
        return Decision::Skip(SkipReason::PerTradeCap);
    }
    if stake_cents < policy.kelly.min_bet_cents {
        return Decision::Skip(SkipReason::MinBet);
    }

    let contracts = stake_cents / opp.ask_cents;
    if contracts < 1 {
        return Decision::Skip(SkipReason::ZeroContracts);
    }
    let cost_cents = contracts * opp.ask_cents;

    // Exposure caps, in order.
    let bankroll = account.bankroll_cents as f64;
    let family = opp.family.to_string();
    if (account.family_open(&family) + cost_cents) as f64 > policy.caps.per_asset_pct * bankroll {
        return Decision::Skip(SkipReason::PerAssetCap);
    }
    if opp.family.is_crypto() {
        let cap_pct = if account.crypto_correlation_high {
            policy.caps.crypto_group_tight_pct
        } else {
            policy.caps.crypto_group_pct
        };
        if (account.crypto_open_cents + cost_cents) as f64 > cap_pct * bankroll {
            return Decision::Skip(SkipReason::CryptoGroupCap);
        }
    } else if (account.weather_open_cents + cost_cents) as f64
        > policy.caps.weather_group_pct * bankroll
    {
        return Decision::Skip(SkipReason::WeatherGroupCap);
    }
    if (account.total_open_cents + cost_cents) as f64 > policy.caps.total_open_pct * bankroll {
        return Decision::Skip(SkipReason::TotalExposureCap);
    }

    debug!(
        ticker = %opp.ticker,
        side = %opp.side,
        contracts,
        cost_cents,
        fraction,
        "candidate sized"
    );
    Decision::Trade(SizedTrade {
        opportunity: opp.clone(),
        contracts,
        cost_cents,
        kelly_fraction: fraction,
        streak_context,
        hot_hand,
        tilt_risk,
    })
}

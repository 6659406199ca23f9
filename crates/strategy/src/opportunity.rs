//! Candidate and skip types shared by the finder and the sizing policy.

use autotrader_core::types::{AssetFamily, Market, Regime, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a market/side or a sized candidate did not become a trade.
///
/// Serialized into `skip` ledger records and tallied per cycle, so the
/// string forms are part of the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    IncoherentBook,
    TooCloseToExpiry,
    ExtremePrice,
    ModelProbFloor,
    ConvictionCeiling,
    MomentumVeto,
    ForecastGapInsufficient,
    CentralBand,
    NoEdge,
    MinEdgeRegime,
    DynamicEdgeFloor,
    ZeroContracts,
    MinBet,
    PerTradeCap,
    PerAssetCap,
    CryptoGroupCap,
    WeatherGroupCap,
    TotalExposureCap,
    MaxOpenPositions,
    MaxTradesPerHour,
    CircuitBreakerTilt,
    KillDailyLoss,
    KillDrawdown,
    KillApiErrors,
    OrderRejected,
}

impl SkipReason {
    /// The wire string, identical to the serde form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncoherentBook => "incoherent_book",
            Self::TooCloseToExpiry => "too_close_to_expiry",
            Self::ExtremePrice => "extreme_price",
            Self::ModelProbFloor => "model_prob_floor",
            Self::ConvictionCeiling => "conviction_ceiling",
            Self::MomentumVeto => "momentum_veto",
            Self::ForecastGapInsufficient => "forecast_gap_insufficient",
            Self::CentralBand => "central_band",
            Self::NoEdge => "no_edge",
            Self::MinEdgeRegime => "min_edge_regime",
            Self::DynamicEdgeFloor => "dynamic_edge_floor",
            Self::ZeroContracts => "zero_contracts",
            Self::MinBet => "min_bet",
            Self::PerTradeCap => "per_trade_cap",
            Self::PerAssetCap => "per_asset_cap",
            Self::CryptoGroupCap => "crypto_group_cap",
            Self::WeatherGroupCap => "weather_group_cap",
            Self::TotalExposureCap => "total_exposure_cap",
            Self::MaxOpenPositions => "max_open_positions",
            Self::MaxTradesPerHour => "max_trades_per_hour",
            Self::CircuitBreakerTilt => "circuit_breaker_tilt",
            Self::KillDailyLoss => "kill_daily_loss",
            Self::KillDrawdown => "kill_drawdown",
            Self::KillApiErrors => "kill_api_errors",
            Self::OrderRejected => "order_rejected",
        }
    }

    /// Session-level reasons halt the whole cycle rather than one
    /// candidate.
    #[must_use]
    pub fn is_halt(self) -> bool {
        matches!(
            self,
            Self::CircuitBreakerTilt
                | Self::KillDailyLoss
                | Self::KillDrawdown
                | Self::KillApiErrors
        )
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One market/side pair that was dropped before sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub ticker: String,
    pub side: Side,
    pub reason: SkipReason,
}

/// A scored candidate the finder hands to the sizing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub ticker: String,
    pub family: AssetFamily,
    pub side: Side,
    pub ask_cents: i64,
    pub expiry: DateTime<Utc>,
    pub minutes_to_expiry: i64,
    /// Strike in USD for crypto, threshold in °F for weather.
    pub strike: f64,
    /// Spot price the model saw, crypto only.
    pub spot: Option<f64>,
    pub our_prob: f64,
    pub market_prob: f64,
    /// `our_prob - market_prob` before bonuses.
    pub edge: f64,
    /// Edge after momentum, volatility, news, and regime adjustments.
    pub edge_adj: f64,
    pub momentum_bonus: f64,
    pub vol_bonus: f64,
    pub news_bonus: f64,
    pub regime_bonus: f64,
    pub regime: Regime,
    /// -1/0/1 as persisted in trade records.
    pub momentum_dir: i8,
    pub momentum_aligned: bool,
    pub vol_ratio: f64,
    pub vol_aligned: bool,
}

/// The finder's per-cycle output.
#[derive(Debug, Clone, Default)]
pub struct FinderOutcome {
    /// Ranked top-K candidates.
    pub opportunities: Vec<Opportunity>,
    /// Everything scored but dropped, with the rule that fired.
    pub skips: Vec<SkippedCandidate>,
}

/// Builds the market-independent parts of an [`Opportunity`].
pub(crate) fn base_opportunity(
    market: &Market,
    side: Side,
    now: DateTime<Utc>,
    our_prob: f64,
    regime: Regime,
) -> Opportunity {
    let market_prob = market.implied_prob(side);
    Opportunity {
        ticker: market.ticker.clone(),
        family: market.family.clone(),
        side,
        ask_cents: market.ask_cents(side),
        expiry: market.expiry,
        minutes_to_expiry: market.minutes_to_expiry(now),
        strike: market.strike,
        spot: None,
        our_prob,
        market_prob,
        edge: our_prob - market_prob,
        edge_adj: our_prob - market_prob,
        momentum_bonus: 0.0,
        vol_bonus: 0.0,
        news_bonus: 0.0,
        regime_bonus: 0.0,
        regime,
        momentum_dir: 0,
        momentum_aligned: false,
        vol_ratio: 1.0,
        vol_aligned: false,
    }
}
